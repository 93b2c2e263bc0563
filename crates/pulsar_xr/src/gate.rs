//! Hardware feature gates
//!
//! A gate turns one fallible enable call and one infallible disable call into
//! a two-state switch. The gate only records `Enabled` after the hardware
//! accepted the request, so a failed enable can never leave a feature half on.

use std::fmt;

use serde::Serialize;

use crate::error::XrResult;

/// Mixed-reality features controlled through a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    PassThrough,
    DepthEstimation,
    EnvironmentReflections,
}

impl Feature {
    pub const ALL: [Feature; 3] = [
        Feature::PassThrough,
        Feature::DepthEstimation,
        Feature::EnvironmentReflections,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::PassThrough => "pass-through",
            Feature::DepthEstimation => "depth-estimation",
            Feature::EnvironmentReflections => "environment-reflections",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Disabled,
    Enabled,
}

impl GateState {
    pub fn is_enabled(self) -> bool {
        self == GateState::Enabled
    }
}

/// Hardware calls and side effects behind a single gate
///
/// `try_enable` performs the hardware call only. Side effects that depend on
/// the feature being on belong in `on_enabled`, which runs only after the
/// hardware accepted the request. `on_disabled` reverts them.
pub trait FeatureActions {
    fn try_enable(&mut self) -> XrResult<()>;

    fn on_enabled(&mut self) {}

    fn disable(&mut self);

    fn on_disabled(&mut self) {}
}

/// Boolean state wrapped around a fallible hardware switch
#[derive(Debug, Clone)]
pub struct FeatureGate {
    feature: Feature,
    state: GateState,
}

impl FeatureGate {
    pub fn new(feature: Feature) -> Self {
        Self {
            feature,
            state: GateState::Disabled,
        }
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    /// Move the gate toward `want` and return the state actually reached.
    ///
    /// Requesting the current state is a no-op. A rejected enable is logged
    /// once and returned as an error with the gate left disabled; nothing is
    /// retried.
    pub fn set_enabled<A>(&mut self, want: bool, actions: &mut A) -> XrResult<bool>
    where
        A: FeatureActions + ?Sized,
    {
        if want == self.is_enabled() {
            return Ok(want);
        }

        if want {
            if let Err(err) = actions.try_enable() {
                tracing::error!("[XR] Failed to enable {}: {}", self.feature, err);
                return Err(err);
            }
            actions.on_enabled();
            self.state = GateState::Enabled;
            tracing::debug!("[XR] {} enabled", self.feature);
            Ok(true)
        } else {
            self.close(actions);
            Ok(false)
        }
    }

    /// Disable the gate if it is open. Used on teardown.
    pub fn force_disable<A>(&mut self, actions: &mut A)
    where
        A: FeatureActions + ?Sized,
    {
        if self.is_enabled() {
            self.close(actions);
        }
    }

    fn close<A>(&mut self, actions: &mut A)
    where
        A: FeatureActions + ?Sized,
    {
        actions.disable();
        actions.on_disabled();
        self.state = GateState::Disabled;
        tracing::debug!("[XR] {} disabled", self.feature);
    }
}
