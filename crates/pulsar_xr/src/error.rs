//! Error taxonomy for the mixed-reality controller.
//!
//! Every failure here is local to one operation. A failed enable leaves its
//! gate disabled and never touches the state of other features.

use crate::gate::Feature;

/// Errors reported by controller operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum XrError {
    #[error("Hardware refused to enable {feature}")]
    HardwareEnableFailure { feature: Feature },

    #[error("{feature} is not supported by the connected device")]
    UnsupportedFeature { feature: Feature },

    #[error("Eye offset must be a number in [0, 1], got {0}")]
    InvalidEyeOffset(f32),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Mixed reality session has already been shut down")]
    SessionEnded,
}

impl XrError {
    /// Feature the error refers to, if it came from a gate
    pub fn feature(&self) -> Option<Feature> {
        match self {
            XrError::HardwareEnableFailure { feature } | XrError::UnsupportedFeature { feature } => {
                Some(*feature)
            }
            _ => None,
        }
    }
}

pub type XrResult<T> = Result<T, XrError>;
