//! Sky profile driver
//!
//! Switches the rendering profile between the streamed environment cubemap
//! ("live") and a static fallback sky ("default").
//!
//! - Live values change with every paired frame, so they are re-applied on
//!   each one.
//! - Default values are constant, so they are written only on the transition
//!   into the default state.

use serde::Serialize;

use crate::exposure::DerivedShading;
use crate::hardware::CubemapSource;
use crate::profile::{
    ProfileHandles, ProfileValue, RenderingProfile, ShaderGlobals, SkyUpdateMode,
};
use crate::sync::PairedFrame;

/// Fixed exposure used with the fallback sky
pub const DEFAULT_SKY_EXPOSURE: f32 = 6.5;

pub const SHADER_WB_GAINS: &str = "_CamWBGains";
pub const SHADER_INV_CCM: &str = "_CamInvCCM";
pub const SHADER_CCM: &str = "_CamCCM";

/// Which parameter set was last written to the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkyMode {
    /// Nothing written yet
    #[default]
    Unapplied,
    Live,
    Default,
}

/// Sent to reflection listeners after each live update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectionUpdate {
    pub exposure: f32,
    /// Seconds between realtime sky re-bakes
    pub refresh_period: f32,
    pub cubemap_timestamp_ns: u64,
    pub metadata_timestamp_ns: u64,
}

pub type ReflectionListener = Box<dyn FnMut(&ReflectionUpdate)>;

/// Observers of live reflection updates
#[derive(Default)]
pub struct ReflectionListeners {
    listeners: Vec<ReflectionListener>,
}

impl ReflectionListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: ReflectionListener) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn notify(&mut self, update: &ReflectionUpdate) {
        if self.listeners.is_empty() {
            return;
        }
        for listener in &mut self.listeners {
            listener(update);
        }
    }
}

/// Static configuration of the sky driver
#[derive(Debug, Clone)]
pub struct SkyConfig {
    pub refresh_rate_hz: u32,
    pub default_sky: CubemapSource,
    /// Pairless ticks tolerated in live mode before falling back
    pub live_hold_ticks: u32,
}

pub struct SkyProfileDriver {
    handles: ProfileHandles,
    config: SkyConfig,
    mode: SkyMode,
    pairless_ticks: u32,
}

impl SkyProfileDriver {
    /// Resolve the profile blocks once and build the driver.
    pub fn new(profile: &mut dyn RenderingProfile, config: SkyConfig) -> Self {
        Self {
            handles: ProfileHandles::resolve(profile),
            config,
            mode: SkyMode::Unapplied,
            pairless_ticks: 0,
        }
    }

    pub fn mode(&self) -> SkyMode {
        self.mode
    }

    /// Seconds between realtime sky updates while live
    pub fn update_period(&self) -> f32 {
        1.0 / self.config.refresh_rate_hz.max(1) as f32
    }

    /// Write the streamed sky, exposure and white balance.
    pub fn apply_live(
        &mut self,
        frame: &PairedFrame,
        shading: &DerivedShading,
        profile: &mut dyn RenderingProfile,
        globals: &mut dyn ShaderGlobals,
        listeners: &mut ReflectionListeners,
    ) {
        let period = self.update_period();
        let handles = self.handles;

        profile.override_value(handles.exposure, ProfileValue::FixedExposure(shading.exposure));
        profile.override_value(handles.sky, ProfileValue::SkyTexture(frame.cubemap.texture.clone()));
        profile.override_value(handles.sky, ProfileValue::SkyUpdateMode(SkyUpdateMode::Realtime));
        profile.override_value(handles.sky, ProfileValue::SkyUpdatePeriod(period));
        profile.override_value(handles.white_balance, ProfileValue::WhiteBalanceIntensity(1.0));

        let white_balance = &shading.white_balance;
        globals.set_global_color(SHADER_WB_GAINS, white_balance.wb_gains);
        globals.set_global_matrix(SHADER_INV_CCM, white_balance.inv_ccm);
        globals.set_global_matrix(SHADER_CCM, white_balance.ccm);

        if self.mode != SkyMode::Live {
            tracing::debug!("[XR SKY] Switching to live environment sky");
        }
        self.mode = SkyMode::Live;
        self.pairless_ticks = 0;

        listeners.notify(&ReflectionUpdate {
            exposure: shading.exposure,
            refresh_period: period,
            cubemap_timestamp_ns: frame.cubemap.timestamp_ns,
            metadata_timestamp_ns: frame.metadata.timestamp_ns,
        });
    }

    /// A tick passed with reflections running but no paired frame.
    ///
    /// Live values are kept for up to `live_hold_ticks` such ticks; after that
    /// the fallback sky is applied. Returns true if the profile was written.
    pub fn on_missing_frame(&mut self, profile: &mut dyn RenderingProfile) -> bool {
        if self.mode == SkyMode::Live && self.pairless_ticks < self.config.live_hold_ticks {
            self.pairless_ticks += 1;
            return false;
        }
        self.ensure_default(profile)
    }

    /// Apply the fallback sky unless it is already active. Returns true if the
    /// profile was written.
    pub fn ensure_default(&mut self, profile: &mut dyn RenderingProfile) -> bool {
        if self.mode == SkyMode::Default {
            return false;
        }

        let handles = self.handles;
        profile.override_value(handles.sky, ProfileValue::SkyTexture(self.config.default_sky.clone()));
        profile.override_value(handles.sky, ProfileValue::SkyUpdateMode(SkyUpdateMode::OnChanged));
        profile.override_value(handles.exposure, ProfileValue::FixedExposure(DEFAULT_SKY_EXPOSURE));
        profile.override_value(handles.white_balance, ProfileValue::WhiteBalanceIntensity(0.0));

        tracing::debug!("[XR SKY] Default sky active");
        self.mode = SkyMode::Default;
        self.pairless_ticks = 0;
        true
    }
}
