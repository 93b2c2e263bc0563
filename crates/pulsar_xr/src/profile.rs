//! Rendering profile overrides
//!
//! The profile container belongs to the renderer. The controller resolves the
//! three blocks it writes once at start and afterwards only pushes override
//! values through the returned handles.

use glam::{Mat4, Vec4};

use crate::hardware::CubemapSource;

/// Override-able parameter blocks used by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterBlock {
    Sky,
    Exposure,
    WhiteBalance,
}

/// Opaque handle to a block inside the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle(pub u32);

/// How often the renderer re-bakes the sky
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkyUpdateMode {
    /// Only when the sky texture changes
    OnChanged,
    /// Continuously, every `SkyUpdatePeriod` seconds
    Realtime,
}

/// A single override written into a block
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileValue {
    SkyTexture(CubemapSource),
    SkyUpdateMode(SkyUpdateMode),
    SkyUpdatePeriod(f32),
    FixedExposure(f32),
    WhiteBalanceIntensity(f32),
}

/// Renderer-owned container of override-able parameter blocks
pub trait RenderingProfile {
    /// Return the handle of `block`, adding it to the profile if missing
    fn get_or_create(&mut self, block: ParameterBlock) -> BlockHandle;

    fn override_value(&mut self, handle: BlockHandle, value: ProfileValue);
}

/// Global shader state visible to every material
pub trait ShaderGlobals {
    fn set_global_color(&mut self, name: &str, value: Vec4);
    fn set_global_matrix(&mut self, name: &str, value: Mat4);
}

/// The three blocks the controller writes to
#[derive(Debug, Clone, Copy)]
pub struct ProfileHandles {
    pub sky: BlockHandle,
    pub exposure: BlockHandle,
    pub white_balance: BlockHandle,
}

impl ProfileHandles {
    pub fn resolve(profile: &mut dyn RenderingProfile) -> Self {
        Self {
            sky: profile.get_or_create(ParameterBlock::Sky),
            exposure: profile.get_or_create(ParameterBlock::Exposure),
            white_balance: profile.get_or_create(ParameterBlock::WhiteBalance),
        }
    }
}
