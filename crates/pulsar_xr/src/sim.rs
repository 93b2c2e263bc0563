//! Simulated headset
//!
//! Headless implementations of every hardware collaborator. Each simulated
//! device comes paired with a handle sharing its state so tests and the
//! session driver can inspect calls and inject faults while the controller
//! owns the device itself.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Vec4};
use parking_lot::Mutex;

use crate::hardware::{
    CameraMetadata, ClearMode, CubemapFrame, CubemapSource, MetadataStream, MixedRealityDriver,
    ReflectionStream, WhiteBalanceNormalization, XrCamera, XrHardware,
};
use crate::profile::{
    BlockHandle, ParameterBlock, ProfileValue, RenderingProfile, ShaderGlobals, SkyUpdateMode,
};
use crate::session::{FrameStage, SessionError};

// ─── Driver ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct DriverState {
    pass_through: bool,
    depth_estimation: bool,
    submit_depth: bool,
    depth_sorting: bool,
    opaque: bool,
    eye_offset: f32,
    eye_offset_writes: usize,
    pass_through_enable_calls: usize,
    depth_enable_calls: usize,
    refuse_pass_through: bool,
    refuse_depth_estimation: bool,
}

impl Default for DriverState {
    fn default() -> Self {
        Self {
            pass_through: false,
            depth_estimation: false,
            submit_depth: false,
            depth_sorting: false,
            opaque: true,
            eye_offset: 1.0,
            eye_offset_writes: 0,
            pass_through_enable_calls: 0,
            depth_enable_calls: 0,
            refuse_pass_through: false,
            refuse_depth_estimation: false,
        }
    }
}

pub struct SimDriver {
    state: Arc<Mutex<DriverState>>,
}

/// Inspection and fault-injection side of a [`SimDriver`]
#[derive(Clone)]
pub struct SimDriverHandle {
    state: Arc<Mutex<DriverState>>,
}

impl SimDriver {
    pub fn new() -> (Self, SimDriverHandle) {
        let state = Arc::new(Mutex::new(DriverState::default()));
        (Self { state: state.clone() }, SimDriverHandle { state })
    }
}

impl MixedRealityDriver for SimDriver {
    fn enable_pass_through(&mut self) -> bool {
        let mut state = self.state.lock();
        state.pass_through_enable_calls += 1;
        state.pass_through = !state.refuse_pass_through;
        state.pass_through
    }

    fn disable_pass_through(&mut self) {
        self.state.lock().pass_through = false;
    }

    fn enable_depth_estimation(&mut self) -> bool {
        let mut state = self.state.lock();
        state.depth_enable_calls += 1;
        state.depth_estimation = !state.refuse_depth_estimation;
        state.depth_estimation
    }

    fn disable_depth_estimation(&mut self) {
        self.state.lock().depth_estimation = false;
    }

    fn submit_depth(&self) -> bool {
        self.state.lock().submit_depth
    }

    fn set_submit_depth(&mut self, value: bool) {
        self.state.lock().submit_depth = value;
    }

    fn depth_sorting(&self) -> bool {
        self.state.lock().depth_sorting
    }

    fn set_depth_sorting(&mut self, value: bool) {
        self.state.lock().depth_sorting = value;
    }

    fn opaque(&self) -> bool {
        self.state.lock().opaque
    }

    fn set_opaque(&mut self, value: bool) {
        self.state.lock().opaque = value;
    }

    fn set_eye_offset(&mut self, value: f32) {
        let mut state = self.state.lock();
        state.eye_offset = value;
        state.eye_offset_writes += 1;
    }
}

impl SimDriverHandle {
    pub fn refuse_pass_through(&self, refuse: bool) {
        self.state.lock().refuse_pass_through = refuse;
    }

    pub fn refuse_depth_estimation(&self, refuse: bool) {
        self.state.lock().refuse_depth_estimation = refuse;
    }

    /// Preset the auxiliary rendering flags, as a previous app might leave them
    pub fn set_flags(&self, opaque: bool, submit_depth: bool, depth_sorting: bool) {
        let mut state = self.state.lock();
        state.opaque = opaque;
        state.submit_depth = submit_depth;
        state.depth_sorting = depth_sorting;
    }

    /// `(opaque, submit_depth, depth_sorting)`
    pub fn flags(&self) -> (bool, bool, bool) {
        let state = self.state.lock();
        (state.opaque, state.submit_depth, state.depth_sorting)
    }

    pub fn pass_through_active(&self) -> bool {
        self.state.lock().pass_through
    }

    pub fn depth_estimation_active(&self) -> bool {
        self.state.lock().depth_estimation
    }

    pub fn pass_through_enable_calls(&self) -> usize {
        self.state.lock().pass_through_enable_calls
    }

    pub fn depth_enable_calls(&self) -> usize {
        self.state.lock().depth_enable_calls
    }

    pub fn eye_offset(&self) -> f32 {
        self.state.lock().eye_offset
    }

    pub fn eye_offset_writes(&self) -> usize {
        self.state.lock().eye_offset_writes
    }
}

// ─── Streams ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ReflectionState {
    supported: bool,
    refuse_start: bool,
    running: bool,
    latest: Option<CubemapFrame>,
    unread: bool,
    reads: usize,
    start_calls: usize,
}

pub struct SimReflectionStream {
    state: Arc<Mutex<ReflectionState>>,
}

#[derive(Clone)]
pub struct SimReflectionHandle {
    state: Arc<Mutex<ReflectionState>>,
}

impl SimReflectionStream {
    pub fn new() -> (Self, SimReflectionHandle) {
        let state = Arc::new(Mutex::new(ReflectionState {
            supported: true,
            refuse_start: false,
            running: false,
            latest: None,
            unread: false,
            reads: 0,
            start_calls: 0,
        }));
        (Self { state: state.clone() }, SimReflectionHandle { state })
    }
}

impl ReflectionStream for SimReflectionStream {
    fn is_supported(&self) -> bool {
        self.state.lock().supported
    }

    fn start(&mut self) -> bool {
        let mut state = self.state.lock();
        state.start_calls += 1;
        state.running = state.supported && !state.refuse_start;
        state.running
    }

    fn stop(&mut self) {
        self.state.lock().running = false;
    }

    fn has_new_frame(&self) -> bool {
        self.state.lock().unread
    }

    fn frame(&mut self) -> CubemapFrame {
        let mut state = self.state.lock();
        state.unread = false;
        state.reads += 1;
        state.latest.clone().unwrap_or(CubemapFrame {
            texture: CubemapSource::Streamed { texture_id: 0 },
            timestamp_ns: 0,
        })
    }
}

impl SimReflectionHandle {
    /// Publish a new cubemap captured at `timestamp_ns`
    pub fn publish(&self, timestamp_ns: u64) {
        let mut state = self.state.lock();
        state.latest = Some(CubemapFrame {
            texture: CubemapSource::Streamed {
                texture_id: timestamp_ns,
            },
            timestamp_ns,
        });
        state.unread = true;
    }

    pub fn set_supported(&self, supported: bool) {
        self.state.lock().supported = supported;
    }

    pub fn refuse_start(&self, refuse: bool) {
        self.state.lock().refuse_start = refuse;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn has_unread_frame(&self) -> bool {
        self.state.lock().unread
    }

    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }

    pub fn start_calls(&self) -> usize {
        self.state.lock().start_calls
    }
}

#[derive(Debug, Default)]
struct MetadataState {
    enabled: bool,
    refuse_enable: bool,
    latest: Option<CameraMetadata>,
    unread: bool,
    reads: usize,
}

pub struct SimMetadataStream {
    state: Arc<Mutex<MetadataState>>,
}

#[derive(Clone)]
pub struct SimMetadataHandle {
    state: Arc<Mutex<MetadataState>>,
}

impl SimMetadataStream {
    pub fn new() -> (Self, SimMetadataHandle) {
        let state = Arc::new(Mutex::new(MetadataState::default()));
        (Self { state: state.clone() }, SimMetadataHandle { state })
    }
}

impl MetadataStream for SimMetadataStream {
    fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    fn enable(&mut self) {
        let mut state = self.state.lock();
        state.enabled = !state.refuse_enable;
    }

    fn disable(&mut self) {
        self.state.lock().enabled = false;
    }

    fn has_new_frame(&self) -> bool {
        self.state.lock().unread
    }

    fn frame(&mut self) -> CameraMetadata {
        let mut state = self.state.lock();
        state.unread = false;
        state.reads += 1;
        state.latest.unwrap_or_default()
    }
}

impl SimMetadataHandle {
    pub fn publish(&self, metadata: CameraMetadata) {
        let mut state = self.state.lock();
        state.latest = Some(metadata);
        state.unread = true;
    }

    pub fn refuse_enable(&self, refuse: bool) {
        self.state.lock().refuse_enable = refuse;
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn has_unread_frame(&self) -> bool {
        self.state.lock().unread
    }

    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }
}

// ─── Renderer side ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ProfileState {
    blocks: Vec<ParameterBlock>,
    overrides: Vec<(BlockHandle, ProfileValue)>,
}

/// Profile that records every override it receives
pub struct RecordingProfile {
    state: Arc<Mutex<ProfileState>>,
}

#[derive(Clone)]
pub struct ProfileLog {
    state: Arc<Mutex<ProfileState>>,
}

impl RecordingProfile {
    pub fn new() -> (Self, ProfileLog) {
        let state = Arc::new(Mutex::new(ProfileState::default()));
        (Self { state: state.clone() }, ProfileLog { state })
    }
}

impl RenderingProfile for RecordingProfile {
    fn get_or_create(&mut self, block: ParameterBlock) -> BlockHandle {
        let mut state = self.state.lock();
        let index = match state.blocks.iter().position(|b| *b == block) {
            Some(index) => index,
            None => {
                state.blocks.push(block);
                state.blocks.len() - 1
            }
        };
        BlockHandle(index as u32)
    }

    fn override_value(&mut self, handle: BlockHandle, value: ProfileValue) {
        self.state.lock().overrides.push((handle, value));
    }
}

impl ProfileLog {
    pub fn block_count(&self) -> usize {
        self.state.lock().blocks.len()
    }

    pub fn override_count(&self) -> usize {
        self.state.lock().overrides.len()
    }

    /// Latest override matching `pick`
    fn latest<T>(&self, pick: impl Fn(&ProfileValue) -> Option<T>) -> Option<T> {
        self.state.lock().overrides.iter().rev().find_map(|(_, value)| pick(value))
    }

    pub fn sky_texture(&self) -> Option<CubemapSource> {
        self.latest(|value| match value {
            ProfileValue::SkyTexture(source) => Some(source.clone()),
            _ => None,
        })
    }

    pub fn sky_update_mode(&self) -> Option<SkyUpdateMode> {
        self.latest(|value| match value {
            ProfileValue::SkyUpdateMode(mode) => Some(*mode),
            _ => None,
        })
    }

    pub fn sky_update_period(&self) -> Option<f32> {
        self.latest(|value| match value {
            ProfileValue::SkyUpdatePeriod(period) => Some(*period),
            _ => None,
        })
    }

    pub fn fixed_exposure(&self) -> Option<f32> {
        self.latest(|value| match value {
            ProfileValue::FixedExposure(exposure) => Some(*exposure),
            _ => None,
        })
    }

    pub fn white_balance_intensity(&self) -> Option<f32> {
        self.latest(|value| match value {
            ProfileValue::WhiteBalanceIntensity(intensity) => Some(*intensity),
            _ => None,
        })
    }
}

#[derive(Debug, Default)]
struct GlobalsState {
    colors: HashMap<String, Vec4>,
    matrices: HashMap<String, Mat4>,
    writes: usize,
}

/// Shader globals that remember the last value per name
pub struct RecordingGlobals {
    state: Arc<Mutex<GlobalsState>>,
}

#[derive(Clone)]
pub struct GlobalsLog {
    state: Arc<Mutex<GlobalsState>>,
}

impl RecordingGlobals {
    pub fn new() -> (Self, GlobalsLog) {
        let state = Arc::new(Mutex::new(GlobalsState::default()));
        (Self { state: state.clone() }, GlobalsLog { state })
    }
}

impl ShaderGlobals for RecordingGlobals {
    fn set_global_color(&mut self, name: &str, value: Vec4) {
        let mut state = self.state.lock();
        state.colors.insert(name.to_string(), value);
        state.writes += 1;
    }

    fn set_global_matrix(&mut self, name: &str, value: Mat4) {
        let mut state = self.state.lock();
        state.matrices.insert(name.to_string(), value);
        state.writes += 1;
    }
}

impl GlobalsLog {
    pub fn color(&self, name: &str) -> Option<Vec4> {
        self.state.lock().colors.get(name).copied()
    }

    pub fn matrix(&self, name: &str) -> Option<Mat4> {
        self.state.lock().matrices.get(name).copied()
    }

    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }
}

pub struct SimCamera {
    mode: Arc<Mutex<Option<ClearMode>>>,
}

#[derive(Clone)]
pub struct SimCameraHandle {
    mode: Arc<Mutex<Option<ClearMode>>>,
}

impl SimCamera {
    pub fn new() -> (Self, SimCameraHandle) {
        let mode = Arc::new(Mutex::new(None));
        (Self { mode: mode.clone() }, SimCameraHandle { mode })
    }
}

impl XrCamera for SimCamera {
    fn set_clear_mode(&mut self, mode: ClearMode) {
        *self.mode.lock() = Some(mode);
    }
}

impl SimCameraHandle {
    pub fn clear_mode(&self) -> Option<ClearMode> {
        *self.mode.lock()
    }
}

// ─── Bundle ──────────────────────────────────────────────────────────────────

/// Handles to every device of a [`SimHeadset`]
#[derive(Clone)]
pub struct SimHandles {
    pub driver: SimDriverHandle,
    pub reflections: SimReflectionHandle,
    pub metadata: SimMetadataHandle,
    pub profile: ProfileLog,
    pub globals: GlobalsLog,
    pub camera: SimCameraHandle,
}

pub struct SimHeadset;

impl SimHeadset {
    /// Build a complete simulated hardware bundle
    pub fn build() -> (XrHardware, SimHandles) {
        let (driver, driver_handle) = SimDriver::new();
        let (reflections, reflections_handle) = SimReflectionStream::new();
        let (metadata, metadata_handle) = SimMetadataStream::new();
        let (profile, profile_log) = RecordingProfile::new();
        let (globals, globals_log) = RecordingGlobals::new();
        let (camera, camera_handle) = SimCamera::new();

        let hardware = XrHardware {
            driver: Box::new(driver),
            reflections: Box::new(reflections),
            metadata: Box::new(metadata),
            profile: Box::new(profile),
            globals: Box::new(globals),
            camera: Some(Box::new(camera)),
        };
        let handles = SimHandles {
            driver: driver_handle,
            reflections: reflections_handle,
            metadata: metadata_handle,
            profile: profile_log,
            globals: globals_log,
            camera: camera_handle,
        };
        (hardware, handles)
    }
}

/// Frame stage that feeds the simulated streams at independent cadences
///
/// Cubemaps are published every `cubemap_period` frames while the reflection
/// stream runs, metadata every `metadata_period` frames while enabled.
pub struct SimStreamStage {
    reflections: SimReflectionHandle,
    metadata: SimMetadataHandle,
    cubemap_period: u64,
    metadata_period: u64,
    frame: u64,
    elapsed_ns: u64,
}

impl SimStreamStage {
    pub fn new(handles: &SimHandles, cubemap_period: u64, metadata_period: u64) -> Self {
        Self {
            reflections: handles.reflections.clone(),
            metadata: handles.metadata.clone(),
            cubemap_period: cubemap_period.max(1),
            metadata_period: metadata_period.max(1),
            frame: 0,
            elapsed_ns: 0,
        }
    }

    fn metadata_at(&self) -> CameraMetadata {
        // Slow exposure drift so the derived value visibly changes.
        let phase = (self.frame % 240) as f64 / 240.0;
        CameraMetadata {
            ev: 6.0 + (phase * std::f64::consts::TAU).sin(),
            camera_calibration_constant: 2.0,
            white_balance: WhiteBalanceNormalization {
                wb_gains: Vec4::new(1.9, 1.0, 1.5, 1.0),
                ..Default::default()
            },
            timestamp_ns: self.elapsed_ns,
        }
    }
}

impl FrameStage for SimStreamStage {
    fn name(&self) -> &'static str {
        "sim_streams"
    }

    fn on_frame(&mut self, delta_time: f32) {
        self.frame += 1;
        self.elapsed_ns += (delta_time.max(0.0) as f64 * 1e9) as u64;

        if self.reflections.is_running() && self.frame % self.cubemap_period == 0 {
            self.reflections.publish(self.elapsed_ns);
        }
        if self.metadata.is_enabled() && self.frame % self.metadata_period == 0 {
            self.metadata.publish(self.metadata_at());
        }
    }

    fn shutdown(&mut self) -> Result<(), SessionError> {
        tracing::debug!("[XR SIM] Stream simulation stopped after {} frames", self.frame);
        Ok(())
    }
}
