//! Mixed-reality feature controller
//!
//! Owns the three feature gates, the eye offset and the reflection pipeline
//! (synchronizer, exposure deriver, sky driver) and drives them once per
//! frame. All hardware is injected at start through [`XrHardware`].
//!
//! # Lifecycle
//!
//! 1. [`MrFeatureController::start`] captures the device flags it will later
//!    restore, then makes the device non-opaque.
//! 2. Toggles and [`MrFeatureController::tick`] run for the rest of the
//!    session, all on the frame thread.
//! 3. [`MrFeatureController::shutdown`] (or drop) closes every gate, flushes
//!    the default sky and restores the captured flags.

use serde::Serialize;

use crate::error::{XrError, XrResult};
use crate::exposure::ExposureDeriver;
use crate::gate::{Feature, FeatureActions, FeatureGate, GateState};
use crate::hardware::{
    ClearMode, MetadataStream, MixedRealityDriver, ReflectionStream, XrCamera, XrHardware,
};
use crate::profile::{RenderingProfile, ShaderGlobals};
use crate::session::{FrameStage, SessionError};
use crate::settings::XrSettings;
use crate::sky::{ReflectionListeners, ReflectionUpdate, SkyMode, SkyProfileDriver};
use crate::sync::{StreamSynchronizer, SyncStats};

/// Eye offset the runtime uses before anything is written
pub const DEVICE_DEFAULT_EYE_OFFSET: f32 = 1.0;

/// Device flags captured at start and restored at shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub opaque: bool,
    pub submit_depth: bool,
    pub depth_sorting: bool,
}

impl SessionSnapshot {
    fn capture(driver: &dyn MixedRealityDriver) -> Self {
        Self {
            opaque: driver.opaque(),
            submit_depth: driver.submit_depth(),
            depth_sorting: driver.depth_sorting(),
        }
    }

    fn restore(&self, driver: &mut dyn MixedRealityDriver) {
        driver.set_opaque(self.opaque);
        driver.set_submit_depth(self.submit_depth);
        driver.set_depth_sorting(self.depth_sorting);
    }
}

/// Depth flags saved by the depth gate while it is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DepthSnapshot {
    submit_depth: bool,
    depth_sorting: bool,
}

struct PassThroughActions<'a> {
    driver: &'a mut dyn MixedRealityDriver,
    camera: &'a mut Option<Box<dyn XrCamera>>,
}

impl FeatureActions for PassThroughActions<'_> {
    fn try_enable(&mut self) -> XrResult<()> {
        if self.driver.enable_pass_through() {
            Ok(())
        } else {
            Err(XrError::HardwareEnableFailure {
                feature: Feature::PassThrough,
            })
        }
    }

    fn on_enabled(&mut self) {
        if let Some(camera) = self.camera.as_mut() {
            camera.set_clear_mode(ClearMode::Color);
        }
    }

    fn disable(&mut self) {
        self.driver.disable_pass_through();
    }

    fn on_disabled(&mut self) {
        if let Some(camera) = self.camera.as_mut() {
            camera.set_clear_mode(ClearMode::Sky);
        }
    }
}

struct DepthEstimationActions<'a> {
    driver: &'a mut dyn MixedRealityDriver,
    snapshot: &'a mut Option<DepthSnapshot>,
}

impl FeatureActions for DepthEstimationActions<'_> {
    fn try_enable(&mut self) -> XrResult<()> {
        if self.driver.enable_depth_estimation() {
            Ok(())
        } else {
            Err(XrError::HardwareEnableFailure {
                feature: Feature::DepthEstimation,
            })
        }
    }

    fn on_enabled(&mut self) {
        // Snapshot before overriding so disable restores what the app had.
        *self.snapshot = Some(DepthSnapshot {
            submit_depth: self.driver.submit_depth(),
            depth_sorting: self.driver.depth_sorting(),
        });
        self.driver.set_submit_depth(true);
        self.driver.set_depth_sorting(true);
    }

    fn disable(&mut self) {
        self.driver.disable_depth_estimation();
    }

    fn on_disabled(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.driver.set_submit_depth(snapshot.submit_depth);
            self.driver.set_depth_sorting(snapshot.depth_sorting);
        }
    }
}

struct ReflectionActions<'a> {
    reflections: &'a mut dyn ReflectionStream,
    metadata: &'a mut dyn MetadataStream,
    metadata_active: &'a mut bool,
}

impl FeatureActions for ReflectionActions<'_> {
    fn try_enable(&mut self) -> XrResult<()> {
        let feature = Feature::EnvironmentReflections;
        if !self.reflections.is_supported() {
            return Err(XrError::UnsupportedFeature { feature });
        }
        if !self.reflections.start() {
            return Err(XrError::HardwareEnableFailure { feature });
        }
        Ok(())
    }

    fn on_enabled(&mut self) {
        if !self.metadata.is_enabled() {
            self.metadata.enable();
        }
        *self.metadata_active = self.metadata.is_enabled();
        if !*self.metadata_active {
            tracing::warn!("[XR] Camera metadata stream did not start; reflections stay on the default sky");
        }
    }

    fn disable(&mut self) {
        self.reflections.stop();
    }

    fn on_disabled(&mut self) {
        self.metadata.disable();
        *self.metadata_active = false;
    }
}

/// Serializable view of the controller for logs and diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub pass_through: GateState,
    pub depth_estimation: GateState,
    pub environment_reflections: GateState,
    pub metadata_stream_active: bool,
    pub eye_offset: f32,
    pub requested_eye_offset: f32,
    pub sky_mode: SkyMode,
    pub sync: SyncStats,
    pub ticks: u64,
    pub shut_down: bool,
}

/// Toggle commands issued by an input layer or a scripted session
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XrCommand {
    TogglePassThrough,
    ToggleDepthEstimation,
    ToggleEnvironmentReflections,
    /// Flip between the camera position (0.0) and the VR eye (1.0)
    ToggleEyeOffset,
    SetEyeOffset(f32),
}

pub struct MrFeatureController {
    driver: Box<dyn MixedRealityDriver>,
    reflections: Box<dyn ReflectionStream>,
    metadata: Box<dyn MetadataStream>,
    profile: Box<dyn RenderingProfile>,
    globals: Box<dyn ShaderGlobals>,
    camera: Option<Box<dyn XrCamera>>,

    pass_through: FeatureGate,
    depth_estimation: FeatureGate,
    environment_reflections: FeatureGate,
    depth_snapshot: Option<DepthSnapshot>,
    metadata_stream_active: bool,

    requested_eye_offset: f32,
    applied_eye_offset: f32,

    synchronizer: StreamSynchronizer,
    deriver: ExposureDeriver,
    sky: SkyProfileDriver,
    listeners: ReflectionListeners,

    session_snapshot: SessionSnapshot,
    ticks: u64,
    shut_down: bool,
}

impl MrFeatureController {
    /// Take ownership of the hardware and begin a session.
    ///
    /// The device flags are captured before anything else touches them, so the
    /// snapshot always predates the first enable.
    pub fn start(hardware: XrHardware, settings: &XrSettings) -> XrResult<Self> {
        settings
            .validate()
            .map_err(|err| XrError::InvalidSettings(err.to_string()))?;

        let XrHardware {
            mut driver,
            reflections,
            metadata,
            mut profile,
            globals,
            camera,
        } = hardware;

        let session_snapshot = SessionSnapshot::capture(driver.as_ref());
        driver.set_opaque(false);

        let sky = SkyProfileDriver::new(profile.as_mut(), settings.sky_config());

        tracing::info!(
            "[XR] Mixed reality session started (refresh {} Hz, eye offset {})",
            settings.refresh_rate_hz,
            settings.initial_eye_offset
        );

        Ok(Self {
            driver,
            reflections,
            metadata,
            profile,
            globals,
            camera,
            pass_through: FeatureGate::new(Feature::PassThrough),
            depth_estimation: FeatureGate::new(Feature::DepthEstimation),
            environment_reflections: FeatureGate::new(Feature::EnvironmentReflections),
            depth_snapshot: None,
            metadata_stream_active: false,
            requested_eye_offset: settings.initial_eye_offset,
            applied_eye_offset: DEVICE_DEFAULT_EYE_OFFSET,
            synchronizer: StreamSynchronizer::new(),
            deriver: ExposureDeriver::new(),
            sky,
            listeners: ReflectionListeners::new(),
            session_snapshot,
            ticks: 0,
            shut_down: false,
        })
    }

    fn ensure_running(&self) -> XrResult<()> {
        if self.shut_down {
            Err(XrError::SessionEnded)
        } else {
            Ok(())
        }
    }

    // ─── Feature toggles ─────────────────────────────────────────────────────

    /// Turn camera pass-through on or off. Returns the state reached.
    pub fn set_pass_through(&mut self, enabled: bool) -> XrResult<bool> {
        self.ensure_running()?;
        let mut actions = PassThroughActions {
            driver: self.driver.as_mut(),
            camera: &mut self.camera,
        };
        self.pass_through.set_enabled(enabled, &mut actions)
    }

    /// Turn depth estimation on or off. Returns the state reached.
    pub fn set_depth_estimation(&mut self, enabled: bool) -> XrResult<bool> {
        self.ensure_running()?;
        let mut actions = DepthEstimationActions {
            driver: self.driver.as_mut(),
            snapshot: &mut self.depth_snapshot,
        };
        self.depth_estimation.set_enabled(enabled, &mut actions)
    }

    /// Turn live environment reflections on or off. Returns the state reached.
    ///
    /// The camera metadata stream only runs while reflections are on.
    pub fn set_environment_reflections(&mut self, enabled: bool) -> XrResult<bool> {
        self.ensure_running()?;
        let mut actions = ReflectionActions {
            reflections: self.reflections.as_mut(),
            metadata: self.metadata.as_mut(),
            metadata_active: &mut self.metadata_stream_active,
        };
        self.environment_reflections.set_enabled(enabled, &mut actions)
    }

    pub fn toggle_pass_through(&mut self) -> XrResult<bool> {
        self.set_pass_through(!self.pass_through.is_enabled())
    }

    pub fn toggle_depth_estimation(&mut self) -> XrResult<bool> {
        self.set_depth_estimation(!self.depth_estimation.is_enabled())
    }

    pub fn toggle_environment_reflections(&mut self) -> XrResult<bool> {
        self.set_environment_reflections(!self.environment_reflections.is_enabled())
    }

    /// Request a new eye offset. The hardware is written on the next tick,
    /// and only if the value differs from the one last applied.
    ///
    /// Values outside `[0, 1]` are clamped. Returns the requested value.
    pub fn set_eye_offset(&mut self, value: f32) -> XrResult<f32> {
        self.ensure_running()?;
        if value.is_nan() {
            return Err(XrError::InvalidEyeOffset(value));
        }

        let clamped = value.clamp(0.0, 1.0);
        if clamped != value {
            tracing::warn!("[XR] Eye offset {} clamped to {}", value, clamped);
        }
        self.requested_eye_offset = clamped;
        Ok(clamped)
    }

    pub fn toggle_eye_offset(&mut self) -> XrResult<f32> {
        let next = if self.requested_eye_offset == 0.0 { 1.0 } else { 0.0 };
        self.set_eye_offset(next)
    }

    pub fn apply(&mut self, command: XrCommand) -> XrResult<()> {
        match command {
            XrCommand::TogglePassThrough => self.toggle_pass_through().map(drop),
            XrCommand::ToggleDepthEstimation => self.toggle_depth_estimation().map(drop),
            XrCommand::ToggleEnvironmentReflections => {
                self.toggle_environment_reflections().map(drop)
            }
            XrCommand::ToggleEyeOffset => self.toggle_eye_offset().map(drop),
            XrCommand::SetEyeOffset(value) => self.set_eye_offset(value).map(drop),
        }
    }

    /// Register an observer called after every live reflection update
    pub fn on_reflection_update<F>(&mut self, listener: F)
    where
        F: FnMut(&ReflectionUpdate) + 'static,
    {
        self.listeners.add(Box::new(listener));
    }

    // ─── Per-frame ───────────────────────────────────────────────────────────

    /// Run one frame of the controller. Does nothing after shutdown.
    pub fn tick(&mut self) {
        if self.shut_down {
            return;
        }
        self.update();
    }

    fn update(&mut self) {
        self.ticks += 1;
        self.apply_eye_offset();

        if self.environment_reflections.is_enabled() && self.metadata_stream_active {
            let frame = self
                .synchronizer
                .try_get_paired_frame(self.reflections.as_mut(), self.metadata.as_mut());
            match frame {
                Some(frame) => {
                    let shading = self.deriver.derive(&frame.metadata);
                    self.sky.apply_live(
                        &frame,
                        &shading,
                        self.profile.as_mut(),
                        self.globals.as_mut(),
                        &mut self.listeners,
                    );
                }
                None => {
                    self.sky.on_missing_frame(self.profile.as_mut());
                }
            }
        } else {
            self.sky.ensure_default(self.profile.as_mut());
        }
    }

    fn apply_eye_offset(&mut self) {
        // Exact comparison: any change, however small, reaches the device.
        if self.requested_eye_offset == self.applied_eye_offset {
            return;
        }
        self.driver.set_eye_offset(self.requested_eye_offset);
        tracing::debug!(
            "[XR] Eye offset {} -> {}",
            self.applied_eye_offset,
            self.requested_eye_offset
        );
        self.applied_eye_offset = self.requested_eye_offset;
    }

    // ─── Teardown ────────────────────────────────────────────────────────────

    /// Close every gate, flush the default sky and restore the device flags
    /// captured at start. Later calls do nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            tracing::debug!("[XR] Shutdown requested again, ignoring");
            return;
        }
        tracing::info!("[XR] Shutting down mixed reality session");

        self.pass_through.force_disable(&mut PassThroughActions {
            driver: self.driver.as_mut(),
            camera: &mut self.camera,
        });
        self.depth_estimation.force_disable(&mut DepthEstimationActions {
            driver: self.driver.as_mut(),
            snapshot: &mut self.depth_snapshot,
        });
        self.environment_reflections.force_disable(&mut ReflectionActions {
            reflections: self.reflections.as_mut(),
            metadata: self.metadata.as_mut(),
            metadata_active: &mut self.metadata_stream_active,
        });

        self.update();
        self.session_snapshot.restore(self.driver.as_mut());
        self.shut_down = true;

        tracing::info!("[XR] Mixed reality session ended after {} ticks", self.ticks);
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn is_pass_through_enabled(&self) -> bool {
        self.pass_through.is_enabled()
    }

    pub fn is_depth_estimation_enabled(&self) -> bool {
        self.depth_estimation.is_enabled()
    }

    pub fn is_environment_reflections_enabled(&self) -> bool {
        self.environment_reflections.is_enabled()
    }

    pub fn is_metadata_stream_active(&self) -> bool {
        self.metadata_stream_active
    }

    pub fn feature_state(&self, feature: Feature) -> GateState {
        match feature {
            Feature::PassThrough => self.pass_through.state(),
            Feature::DepthEstimation => self.depth_estimation.state(),
            Feature::EnvironmentReflections => self.environment_reflections.state(),
        }
    }

    /// Eye offset last written to the device
    pub fn eye_offset(&self) -> f32 {
        self.applied_eye_offset
    }

    pub fn requested_eye_offset(&self) -> f32 {
        self.requested_eye_offset
    }

    pub fn sky_mode(&self) -> SkyMode {
        self.sky.mode()
    }

    pub fn session_snapshot(&self) -> SessionSnapshot {
        self.session_snapshot
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            pass_through: self.pass_through.state(),
            depth_estimation: self.depth_estimation.state(),
            environment_reflections: self.environment_reflections.state(),
            metadata_stream_active: self.metadata_stream_active,
            eye_offset: self.applied_eye_offset,
            requested_eye_offset: self.requested_eye_offset,
            sky_mode: self.sky.mode(),
            sync: self.synchronizer.stats(),
            ticks: self.ticks,
            shut_down: self.shut_down,
        }
    }
}

impl FrameStage for MrFeatureController {
    fn name(&self) -> &'static str {
        "mr_features"
    }

    fn on_frame(&mut self, _delta_time: f32) {
        self.tick();
    }

    fn shutdown(&mut self) -> Result<(), SessionError> {
        MrFeatureController::shutdown(self);
        Ok(())
    }
}

impl Drop for MrFeatureController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::CameraMetadata;
    use crate::sim::{SimHandles, SimHeadset};

    fn start() -> (MrFeatureController, SimHandles) {
        let (hardware, handles) = SimHeadset::build();
        let controller = MrFeatureController::start(hardware, &XrSettings::default()).unwrap();
        (controller, handles)
    }

    #[test]
    fn test_start_captures_flags_then_clears_opaque() {
        let (hardware, handles) = SimHeadset::build();
        handles.driver.set_flags(true, false, true);

        let controller = MrFeatureController::start(hardware, &XrSettings::default()).unwrap();
        assert_eq!(
            controller.session_snapshot(),
            SessionSnapshot {
                opaque: true,
                submit_depth: false,
                depth_sorting: true,
            }
        );
        assert_eq!(handles.driver.flags(), (false, false, true));
        assert_eq!(handles.profile.block_count(), 3);
    }

    #[test]
    fn test_start_rejects_invalid_settings() {
        let (hardware, _) = SimHeadset::build();
        let settings = XrSettings {
            refresh_rate_hz: 0,
            ..Default::default()
        };
        let result = MrFeatureController::start(hardware, &settings);
        assert!(matches!(result, Err(XrError::InvalidSettings(_))));
    }

    #[test]
    fn test_pass_through_switches_clear_mode() {
        let (mut controller, handles) = start();

        assert_eq!(controller.set_pass_through(true), Ok(true));
        assert_eq!(handles.camera.clear_mode(), Some(ClearMode::Color));
        assert!(handles.driver.pass_through_active());

        assert_eq!(controller.set_pass_through(false), Ok(false));
        assert_eq!(handles.camera.clear_mode(), Some(ClearMode::Sky));
        assert!(!handles.driver.pass_through_active());
    }

    #[test]
    fn test_depth_guard_uses_own_state() {
        let (mut controller, handles) = start();

        // Pass-through on must not make depth estimation look enabled.
        controller.set_pass_through(true).unwrap();
        assert_eq!(controller.set_depth_estimation(true), Ok(true));
        assert_eq!(handles.driver.depth_enable_calls(), 1);
        assert!(controller.is_depth_estimation_enabled());
    }

    #[test]
    fn test_reflections_unsupported_is_reported() {
        let (mut controller, handles) = start();
        handles.reflections.set_supported(false);

        let result = controller.set_environment_reflections(true);
        assert_eq!(
            result,
            Err(XrError::UnsupportedFeature {
                feature: Feature::EnvironmentReflections
            })
        );
        assert_eq!(
            result.unwrap_err().feature(),
            Some(Feature::EnvironmentReflections)
        );
        assert!(!controller.is_environment_reflections_enabled());
        assert!(!handles.metadata.is_enabled());
        assert_eq!(handles.reflections.start_calls(), 0);
    }

    #[test]
    fn test_reflections_start_failure_leaves_metadata_off() {
        let (mut controller, handles) = start();
        handles.reflections.refuse_start(true);

        let err = controller.set_environment_reflections(true).unwrap_err();
        assert!(matches!(err, XrError::HardwareEnableFailure { .. }));
        assert_eq!(err.feature(), Some(Feature::EnvironmentReflections));
        assert!(!handles.metadata.is_enabled());
        assert!(!controller.is_metadata_stream_active());
    }

    #[test]
    fn test_metadata_stream_follows_reflections() {
        let (mut controller, handles) = start();

        controller.set_environment_reflections(true).unwrap();
        assert!(handles.metadata.is_enabled());
        assert!(controller.is_metadata_stream_active());

        controller.set_environment_reflections(false).unwrap();
        assert!(!handles.metadata.is_enabled());
        assert!(!handles.reflections.is_running());
        assert!(!controller.is_metadata_stream_active());
    }

    #[test]
    fn test_inactive_metadata_keeps_default_sky() {
        let (mut controller, handles) = start();
        handles.metadata.refuse_enable(true);

        assert_eq!(controller.set_environment_reflections(true), Ok(true));
        handles.reflections.publish(1);
        handles.metadata.publish(CameraMetadata::default());
        controller.tick();

        assert_eq!(controller.sky_mode(), SkyMode::Default);
        assert_eq!(handles.reflections.reads(), 0);
    }

    #[test]
    fn test_eye_offset_clamps_and_rejects_nan() {
        let (mut controller, _) = start();
        assert_eq!(controller.set_eye_offset(1.7), Ok(1.0));
        assert_eq!(controller.set_eye_offset(-0.2), Ok(0.0));
        assert!(matches!(
            controller.set_eye_offset(f32::NAN),
            Err(XrError::InvalidEyeOffset(_))
        ));
        assert_eq!(controller.requested_eye_offset(), 0.0);
    }

    #[test]
    fn test_toggle_eye_offset_flips_between_extremes() {
        let (mut controller, handles) = start();

        assert_eq!(controller.toggle_eye_offset(), Ok(0.0));
        controller.tick();
        assert_eq!(handles.driver.eye_offset(), 0.0);

        controller.set_eye_offset(0.4).unwrap();
        assert_eq!(controller.toggle_eye_offset(), Ok(0.0));
        assert_eq!(controller.toggle_eye_offset(), Ok(1.0));
    }

    #[test]
    fn test_apply_commands() {
        let (mut controller, _) = start();
        controller.apply(XrCommand::TogglePassThrough).unwrap();
        controller.apply(XrCommand::ToggleDepthEstimation).unwrap();
        controller.apply(XrCommand::SetEyeOffset(0.25)).unwrap();

        let status = controller.status();
        assert_eq!(status.pass_through, GateState::Enabled);
        assert_eq!(status.depth_estimation, GateState::Enabled);
        assert_eq!(status.environment_reflections, GateState::Disabled);
        assert_eq!(status.requested_eye_offset, 0.25);

        controller.apply(XrCommand::TogglePassThrough).unwrap();
        assert!(!controller.is_pass_through_enabled());
    }

    #[test]
    fn test_toggles_rejected_after_shutdown() {
        let (mut controller, handles) = start();
        controller.shutdown();

        assert_eq!(controller.set_pass_through(true), Err(XrError::SessionEnded));
        assert_eq!(controller.set_eye_offset(0.5), Err(XrError::SessionEnded));
        assert_eq!(XrError::SessionEnded.feature(), None);
        assert_eq!(handles.driver.pass_through_enable_calls(), 0);
    }

    #[test]
    fn test_feature_state_tracks_each_gate() {
        let (mut controller, _) = start();
        for feature in Feature::ALL {
            assert_eq!(controller.feature_state(feature), GateState::Disabled);
        }

        controller.set_depth_estimation(true).unwrap();
        for feature in Feature::ALL {
            let expected = if feature == Feature::DepthEstimation {
                GateState::Enabled
            } else {
                GateState::Disabled
            };
            assert_eq!(controller.feature_state(feature), expected);
        }
    }
}
