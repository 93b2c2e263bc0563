//! Exposure and white-balance derivation from camera metadata.

use crate::hardware::{CameraMetadata, WhiteBalanceNormalization};

/// Shading parameters derived from one metadata frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedShading {
    /// Fixed exposure in stops
    pub exposure: f32,
    /// Forwarded untouched to the shading stage
    pub white_balance: WhiteBalanceNormalization,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExposureDeriver;

impl ExposureDeriver {
    pub fn new() -> Self {
        Self
    }

    /// `exposure = ev + log2(camera_calibration_constant)`
    ///
    /// The calibration constant is a linear gain; its log2 moves it into the
    /// same stop domain as the EV. A constant that is not a positive finite
    /// number has no stop equivalent, so the raw EV is used instead.
    pub fn derive(&self, metadata: &CameraMetadata) -> DerivedShading {
        let calibration = metadata.camera_calibration_constant;
        let correction = if calibration.is_finite() && calibration > 0.0 {
            calibration.log2()
        } else {
            tracing::warn!(
                "[XR EXPOSURE] Ignoring invalid camera calibration constant {}",
                calibration
            );
            0.0
        };

        DerivedShading {
            exposure: (metadata.ev + correction) as f32,
            white_balance: metadata.white_balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec4};

    fn metadata(ev: f64, calibration: f64) -> CameraMetadata {
        CameraMetadata {
            ev,
            camera_calibration_constant: calibration,
            ..Default::default()
        }
    }

    #[test]
    fn test_calibration_adds_log2_stops() {
        let derived = ExposureDeriver::new().derive(&metadata(2.0, 4.0));
        assert_eq!(derived.exposure, 4.0);

        let derived = ExposureDeriver::new().derive(&metadata(7.5, 0.5));
        assert_eq!(derived.exposure, 6.5);
    }

    #[test]
    fn test_unit_calibration_keeps_ev() {
        let derived = ExposureDeriver::new().derive(&metadata(3.25, 1.0));
        assert_eq!(derived.exposure, 3.25);
    }

    #[test]
    fn test_invalid_calibration_falls_back_to_ev() {
        assert_eq!(ExposureDeriver::new().derive(&metadata(5.0, 0.0)).exposure, 5.0);
        assert_eq!(ExposureDeriver::new().derive(&metadata(5.0, -2.0)).exposure, 5.0);
        assert_eq!(ExposureDeriver::new().derive(&metadata(5.0, f64::NAN)).exposure, 5.0);
    }

    #[test]
    fn test_white_balance_is_forwarded_unmodified() {
        let white_balance = WhiteBalanceNormalization {
            wb_gains: Vec4::new(1.8, 1.0, 1.4, 1.0),
            inv_ccm: Mat4::from_diagonal(Vec4::new(0.5, 0.5, 0.5, 1.0)),
            ccm: Mat4::from_diagonal(Vec4::new(2.0, 2.0, 2.0, 1.0)),
        };
        let frame = CameraMetadata {
            white_balance,
            ..metadata(1.0, 1.0)
        };

        assert_eq!(ExposureDeriver::new().derive(&frame).white_balance, white_balance);
    }
}
