//! Caller-supplied configuration and algorithm constants.

use crate::position::PositionConvention;

/// Default detection threshold, in units of the background standard deviation.
pub const DEF_THRESH: f64 = 3.0;
/// Smallest threshold accepted; lower values are silently raised to this.
pub const MIN_THRESH: f64 = 1.5;
/// Smallest search radius (pixels); lower values are silently raised to this.
pub const MIN_RAD: f64 = 3.0;
/// Largest search radius (pixels) the public entry points accept.
pub const MAX_RAD: f64 = 10_000.0;
/// Added to the search radius to get the half-width of the background box.
pub const OUTER_RAD_ADD: usize = 10;
/// Ceiling on the number of centroid walk iterations.
pub const MAX_ITER: usize = 40;
/// Fewest pixels that can give a usable median and standard deviation.
pub const MIN_PIX_FOR_STATS: usize = 20;
/// Ratio of full width at half maximum to sigma for a Gaussian.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3;

/// Clamp a radius to [`MIN_RAD`]..=[`MAX_RAD`] and round it to the nearest
/// integer. NaN maps to [`MIN_RAD`].
pub fn condition_rad(rad: f64) -> usize {
    if rad.is_nan() {
        return MIN_RAD as usize;
    }
    rad.clamp(MIN_RAD, MAX_RAD).round() as usize
}

/// Settings for [`centroid`](crate::centroid::centroid) and [`crate::basic_centroid`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CentroidConfig {
    /// Pixels above `median + thresh * stdDev` count as signal.
    /// Default: [`DEF_THRESH`]
    pub thresh: f64,

    /// Check for usable signal at (initial guess, final centroid).
    /// Default: (true, true)
    pub check_signal: (bool, bool),

    /// Position convention of all x,y inputs and outputs.
    pub convention: PositionConvention,

    /// 0: silent, 1: warnings, 2: information, 3+: iteration details.
    /// Only affects diagnostics emitted through `tracing`.
    pub verbosity: u8,
}

impl Default for CentroidConfig {
    fn default() -> Self {
        Self {
            thresh: DEF_THRESH,
            check_signal: (true, true),
            convention: PositionConvention::default(),
            verbosity: 0,
        }
    }
}

/// Settings for [`find_stars`](crate::find_stars::find_stars).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FindStarsConfig {
    /// Detection threshold in units of the background standard deviation.
    /// Default: [`DEF_THRESH`]
    pub thresh: f64,

    /// Centroid radius = `rad_mult * max(blob width, blob height) / 2`.
    /// Ignored when `rad` is set; otherwise must be finite and positive.
    /// Default: 1.0
    pub rad_mult: f64,

    /// Fixed centroid radius for every candidate; overrides `rad_mult`.
    /// Default: None
    pub rad: Option<f64>,

    /// Signal checks passed on to each centroid.
    /// Default: (true, true)
    pub check_signal: (bool, bool),

    /// Position convention of all x,y outputs.
    pub convention: PositionConvention,

    /// 0: silent, 1: warn about skipped candidates, 2: information, 3+: iteration details.
    /// Default: 1
    pub verbosity: u8,
}

impl Default for FindStarsConfig {
    fn default() -> Self {
        Self {
            thresh: DEF_THRESH,
            rad_mult: 1.0,
            rad: None,
            check_signal: (true, true),
            convention: PositionConvention::default(),
            verbosity: 1,
        }
    }
}

impl FindStarsConfig {
    /// Settings used to centroid each candidate.
    pub fn centroid_config(&self) -> CentroidConfig {
        CentroidConfig {
            thresh: self.thresh,
            check_signal: self.check_signal,
            convention: self.convention,
            verbosity: self.verbosity,
        }
    }
}

/// Settings for [`crate::star_shape`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShapeConfig {
    /// Position convention of the star center.
    pub convention: PositionConvention,
    /// 0: silent, 2: fit summary, 3+: every trial width.
    pub verbosity: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_rad() {
        assert_eq!(condition_rad(0.5), 3);
        assert_eq!(condition_rad(6.0), 6);
        assert_eq!(condition_rad(6.4), 6);
        assert_eq!(condition_rad(6.6), 7);
        assert_eq!(condition_rad(f64::NAN), 3);
        assert_eq!(condition_rad(f64::INFINITY), 10_000);
    }

    #[test]
    fn test_fwhm_per_sigma() {
        let expected = 2.0 * (2.0 * 2.0_f64.ln()).sqrt();
        assert!((FWHM_PER_SIGMA - expected).abs() < 1e-12);
    }

    #[test]
    fn test_centroid_config_from_find_stars() {
        let fs = FindStarsConfig {
            thresh: 4.0,
            check_signal: (false, true),
            verbosity: 2,
            ..Default::default()
        };
        let cc = fs.centroid_config();
        assert_eq!(cc.thresh, 4.0);
        assert_eq!(cc.check_signal, (false, true));
        assert_eq!(cc.verbosity, 2);
    }
}
