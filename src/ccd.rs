//! Detector calibration parameters.

use ndarray::{Array2, ArrayView2};

/// Saturation level of a 16-bit detector (ADU).
pub const SAT_LEVEL_16BIT: f64 = 65535.0;

/// CCD calibration. Immutable; supplied with every call.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CcdInfo {
    /// Bias level (ADU).
    pub bias: f64,
    /// Read noise (e-).
    pub read_noise: f64,
    /// Inverse gain (e-/ADU).
    pub ccd_gain: f64,
    /// Saturation level (ADU); data >= sat_level is saturated. `None` if unknown.
    pub sat_level: Option<f64>,
}

impl CcdInfo {
    /// New calibration with the default 16-bit saturation level.
    pub fn new(bias: f64, read_noise: f64, ccd_gain: f64) -> Self {
        Self {
            bias,
            read_noise,
            ccd_gain,
            sat_level: Some(SAT_LEVEL_16BIT),
        }
    }

    /// Read noise expressed in ADU.
    pub fn read_noise_adu(&self) -> f64 {
        self.read_noise / self.ccd_gain
    }

    /// Build a saturation mask from `sat_level`, or `None` if it is unknown.
    pub fn saturation_mask(&self, data: &ArrayView2<f32>) -> Option<Array2<bool>> {
        self.sat_level
            .map(|level| data.mapv(|v| f64::from(v) >= level))
    }
}

impl std::fmt::Display for CcdInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CcdInfo(bias={}, readNoise={}, ccdGain={}",
            self.bias, self.read_noise, self.ccd_gain
        )?;
        if let Some(level) = self.sat_level {
            write!(f, ", satLevel={}", level)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_saturation_mask() {
        let ccd = CcdInfo {
            sat_level: Some(1000.0),
            ..CcdInfo::new(100.0, 10.0, 2.0)
        };
        let data = array![[10.0_f32, 1000.0], [999.0, 2000.0]];
        let sat = ccd.saturation_mask(&data.view()).unwrap();
        assert_eq!(sat, array![[false, true], [false, true]]);

        let unknown = CcdInfo {
            sat_level: None,
            ..ccd
        };
        assert!(unknown.saturation_mask(&data.view()).is_none());
        assert!((ccd.read_noise_adu() - 5.0).abs() < 1e-12);
    }
}
