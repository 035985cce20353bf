//! Robust background statistics.
//!
//! The sky level and noise are estimated from quartiles of a sorted sample.
//! The sample is trimmed twice at `median + 2.35 * stdDev` so that stars do
//! not inflate the estimate.

use ndarray::ArrayView2;

use crate::config::MIN_THRESH;
use crate::error::{GuideError, Result};

/// Ratio of standard deviation to interquartile range for a Gaussian.
const STD_PER_IQR: f64 = 0.741;
/// Trim values above `median + CLIP_SIGMA * stdDev` between passes.
const CLIP_SIGMA: f64 = 2.35;
/// Number of passes; the sample is trimmed after every pass but the last.
const MAX_PASSES: usize = 3;
/// Fewest points `get_quartile` accepts.
const MIN_QUARTILE_PTS: usize = 3;

/// Interpolation weights (low, high) indexed by `((n - 1) * q) % 4`.
const QUARTILE_RATIOS: [(f64, f64); 4] = [
    (1.0, 0.0),
    (1.0, 1.0 / 3.0),
    (1.0, 1.0),
    (1.0 / 3.0, 1.0),
];

/// Which quartile to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quartile {
    Q1 = 1,
    Median = 2,
    Q3 = 3,
}

/// Background statistics.
///
/// `med`, `std_dev` and `data_cut` are NaN when they could not be computed;
/// `n_pts` is always the size of the sample that was available.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageStats {
    /// Median of the trimmed sample.
    pub med: f64,
    /// Standard deviation estimated from the interquartile range.
    pub std_dev: f64,
    /// Size of the trimmed sample.
    pub n_pts: usize,
    /// Threshold actually used (never below [`MIN_THRESH`]).
    pub thresh: f64,
    /// `med + std_dev * thresh`; values above this count as signal.
    pub data_cut: f64,
}

impl ImageStats {
    /// Statistics that could not be computed from `n_pts` points.
    pub fn unknown(n_pts: usize) -> Self {
        Self {
            med: f64::NAN,
            std_dev: f64::NAN,
            n_pts,
            thresh: f64::NAN,
            data_cut: f64::NAN,
        }
    }

    /// True if the median and standard deviation were computed.
    pub fn is_known(&self) -> bool {
        self.med.is_finite() && self.std_dev.is_finite()
    }
}

impl std::fmt::Display for ImageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ImageStats(med={:.2}, stdDev={:.2}, nPts={}, thresh={:.2}, dataCut={:.2})",
            self.med, self.std_dev, self.n_pts, self.thresh, self.data_cut
        )
    }
}

/// Get a quartile from sorted data by linear interpolation.
///
/// `sorted` must be sorted ascending and have at least 3 elements.
pub fn get_quartile(sorted: &[f64], q: Quartile) -> Result<f64> {
    let n = sorted.len();
    if n < MIN_QUARTILE_PTS {
        return Err(GuideError::InsufficientData {
            n_pts: n,
            min_pts: MIN_QUARTILE_PTS,
        });
    }
    let scaled = (n - 1) * q as usize;
    let (r0, r1) = QUARTILE_RATIOS[scaled % 4];
    let ind0 = scaled / 4;
    Ok((sorted[ind0] * r0 + sorted[ind0 + 1] * r1) / (r0 + r1))
}

/// Compute background statistics of an image, ignoring masked pixels.
///
/// `mask` is true for pixels to ignore and must match `data` in shape.
pub fn sky_stats(
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    thresh: f64,
) -> Result<ImageStats> {
    crate::error::check_mask_shape(data, mask, "mask")?;
    let values: Vec<f64> = match mask {
        Some(m) => data
            .iter()
            .zip(m.iter())
            .filter(|(_, &masked)| !masked)
            .map(|(&v, _)| f64::from(v))
            .collect(),
        None => data.iter().map(|&v| f64::from(v)).collect(),
    };
    sky_stats_from_values(values, thresh)
}

/// Compute background statistics of an unordered sample.
///
/// Non-finite values are dropped. The result does not depend on the order
/// of `values`.
pub fn sky_stats_from_values(mut values: Vec<f64>, thresh: f64) -> Result<ImageStats> {
    values.retain(|v| v.is_finite());
    values.sort_by(f64::total_cmp);

    let mut data_len = values.len();
    let mut med = f64::NAN;
    let mut std_dev = f64::NAN;
    for pass in 1..=MAX_PASSES {
        let sample = &values[..data_len];
        let q1 = get_quartile(sample, Quartile::Q1)?;
        med = get_quartile(sample, Quartile::Median)?;
        let q3 = get_quartile(sample, Quartile::Q3)?;
        std_dev = STD_PER_IQR * (q3 - q1);
        if pass == MAX_PASSES {
            break;
        }
        let cut_val = med + CLIP_SIGMA * std_dev;
        let cut_ind = sample.partition_point(|&v| v < cut_val);
        if cut_ind < MIN_QUARTILE_PTS {
            break;
        }
        data_len = cut_ind;
    }

    let thresh = thresh.max(MIN_THRESH);
    Ok(ImageStats {
        med,
        std_dev,
        n_pts: data_len,
        thresh,
        data_cut: med + std_dev * thresh,
    })
}
