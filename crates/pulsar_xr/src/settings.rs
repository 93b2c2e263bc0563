//! Mixed-reality settings
//!
//! Stored as TOML next to the other engine configs. Every field has a
//! default so a partial file is valid.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::hardware::CubemapSource;
use crate::sky::SkyConfig;

/// Errors raised while loading or saving settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Features the session driver turns on right after start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupFeatures {
    pub pass_through: bool,
    pub depth_estimation: bool,
    pub environment_reflections: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XrSettings {
    /// Realtime sky update rate while live reflections are applied
    pub refresh_rate_hz: u32,
    /// Asset used as the sky when no live cubemap is available
    pub default_sky_texture: String,
    /// Eye offset requested at start, 0.0 (camera) to 1.0 (VR eye)
    pub initial_eye_offset: f32,
    /// Pairless ticks tolerated in live mode before the fallback sky returns
    pub live_hold_ticks: u32,
    pub startup: StartupFeatures,
}

impl Default for XrSettings {
    fn default() -> Self {
        Self {
            refresh_rate_hz: 30,
            default_sky_texture: "skies/default_cubemap.exr".to_string(),
            initial_eye_offset: 1.0,
            live_hold_ticks: 0,
            startup: StartupFeatures::default(),
        }
    }
}

impl XrSettings {
    /// Load and validate settings from a TOML file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let settings = Self::from_toml(&contents)?;
        tracing::debug!("[XR SETTINGS] Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load settings, writing the defaults first if the file does not exist
    pub fn load_or_create(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let defaults = Self::default();
            defaults.save(path)?;
            tracing::info!("[XR SETTINGS] Created default settings at {}", path.display());
            return Ok(defaults);
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn from_toml(contents: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.refresh_rate_hz == 0 {
            return Err(SettingsError::Invalid {
                field: "refresh_rate_hz",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.initial_eye_offset) {
            return Err(SettingsError::Invalid {
                field: "initial_eye_offset",
                reason: format!("{} is outside [0, 1]", self.initial_eye_offset),
            });
        }
        if self.default_sky_texture.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "default_sky_texture",
                reason: "must name an asset".to_string(),
            });
        }
        Ok(())
    }

    pub fn sky_config(&self) -> SkyConfig {
        SkyConfig {
            refresh_rate_hz: self.refresh_rate_hz,
            default_sky: CubemapSource::Asset(self.default_sky_texture.clone()),
            live_hold_ticks: self.live_hold_ticks,
        }
    }
}
