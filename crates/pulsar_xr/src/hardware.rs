//! Hardware collaborators
//!
//! The controller never talks to a vendor runtime directly. Everything it
//! needs from the headset is expressed by the traits in this module and
//! injected through [`XrHardware`].

use glam::{Mat4, Vec4};

use crate::profile::{RenderingProfile, ShaderGlobals};

/// Device-level switches exposed by the mixed-reality runtime
pub trait MixedRealityDriver {
    /// Start rendering the camera pass-through feed. Returns false if refused.
    fn enable_pass_through(&mut self) -> bool;
    fn disable_pass_through(&mut self);

    /// Start per-pixel depth estimation. Returns false if refused.
    fn enable_depth_estimation(&mut self) -> bool;
    fn disable_depth_estimation(&mut self);

    fn submit_depth(&self) -> bool;
    fn set_submit_depth(&mut self, value: bool);

    fn depth_sorting(&self) -> bool;
    fn set_depth_sorting(&mut self, value: bool);

    fn opaque(&self) -> bool;
    fn set_opaque(&mut self, value: bool);

    /// Blend between the VR eye position (1.0) and the camera position (0.0)
    fn set_eye_offset(&mut self, value: f32);
}

/// Live environment cubemap capture
pub trait ReflectionStream {
    fn is_supported(&self) -> bool;
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn has_new_frame(&self) -> bool;
    /// Read the latest frame, consuming the "new frame" flag
    fn frame(&mut self) -> CubemapFrame;
}

/// Camera exposure and white-balance metadata
pub trait MetadataStream {
    fn is_enabled(&self) -> bool;
    fn enable(&mut self);
    fn disable(&mut self);
    fn has_new_frame(&self) -> bool;
    /// Read the latest frame, consuming the "new frame" flag
    fn frame(&mut self) -> CameraMetadata;
}

/// Background clear behaviour of the XR camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMode {
    /// Clear to a solid color so the pass-through feed shows behind content
    Color,
    /// Clear to the sky
    Sky,
}

/// Camera whose clear mode follows the pass-through state
pub trait XrCamera {
    fn set_clear_mode(&mut self, mode: ClearMode);
}

/// Where a sky cubemap comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CubemapSource {
    /// Static asset reference, e.g. the fallback sky
    Asset(String),
    /// Texture owned by the reflection stream
    Streamed { texture_id: u64 },
}

/// One environment cubemap capture
#[derive(Debug, Clone, PartialEq)]
pub struct CubemapFrame {
    pub texture: CubemapSource,
    pub timestamp_ns: u64,
}

/// White-balance normalization data reported with each camera frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhiteBalanceNormalization {
    pub wb_gains: Vec4,
    pub inv_ccm: Mat4,
    pub ccm: Mat4,
}

impl Default for WhiteBalanceNormalization {
    fn default() -> Self {
        Self {
            wb_gains: Vec4::ONE,
            inv_ccm: Mat4::IDENTITY,
            ccm: Mat4::IDENTITY,
        }
    }
}

/// One camera metadata frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMetadata {
    /// Exposure value in stops
    pub ev: f64,
    /// Per-unit calibration gain as a linear multiplier
    pub camera_calibration_constant: f64,
    pub white_balance: WhiteBalanceNormalization,
    pub timestamp_ns: u64,
}

impl Default for CameraMetadata {
    fn default() -> Self {
        Self {
            ev: 0.0,
            camera_calibration_constant: 1.0,
            white_balance: WhiteBalanceNormalization::default(),
            timestamp_ns: 0,
        }
    }
}

/// Everything the controller needs from the outside world
pub struct XrHardware {
    pub driver: Box<dyn MixedRealityDriver>,
    pub reflections: Box<dyn ReflectionStream>,
    pub metadata: Box<dyn MetadataStream>,
    pub profile: Box<dyn RenderingProfile>,
    pub globals: Box<dyn ShaderGlobals>,
    pub camera: Option<Box<dyn XrCamera>>,
}
