//! # Pulsar XR
//!
//! Mixed-reality feature control for pass-through headsets. The controller
//! switches camera pass-through, depth estimation and live environment
//! reflections on and off, pairs the reflection and camera-metadata streams,
//! derives exposure and white balance from the metadata, and drives the sky
//! of the rendering profile. Shutdown always returns the device to the flags
//! it had before the session.
//!
//! The hardware is never looked up globally; it is handed to
//! [`MrFeatureController::start`] as an [`XrHardware`] bundle. The `sim`
//! feature provides a headless headset for tests and tooling.

pub mod controller;
pub mod error;
pub mod exposure;
pub mod gate;
pub mod hardware;
pub mod profile;
pub mod session;
pub mod settings;
pub mod sky;
pub mod sync;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use controller::{
    ControllerStatus, MrFeatureController, SessionSnapshot, XrCommand, DEVICE_DEFAULT_EYE_OFFSET,
};
pub use error::{XrError, XrResult};
pub use exposure::{DerivedShading, ExposureDeriver};
pub use gate::{Feature, FeatureActions, FeatureGate, GateState};
pub use hardware::{
    CameraMetadata, ClearMode, CubemapFrame, CubemapSource, MetadataStream, MixedRealityDriver,
    ReflectionStream, WhiteBalanceNormalization, XrCamera, XrHardware,
};
pub use profile::{
    BlockHandle, ParameterBlock, ProfileHandles, ProfileValue, RenderingProfile, ShaderGlobals,
    SkyUpdateMode,
};
pub use session::{FrameStage, SessionError, SessionLoop};
pub use settings::{SettingsError, StartupFeatures, XrSettings};
pub use sky::{ReflectionUpdate, SkyConfig, SkyMode, SkyProfileDriver, DEFAULT_SKY_EXPOSURE};
pub use sync::{PairedFrame, StreamSynchronizer, SyncStats};
