//! Error taxonomy.
//!
//! Only contract violations ([`GuideError::InputShape`],
//! [`GuideError::InvalidParameter`]) reach the caller of the public entry
//! points as `Err`. The remaining variants describe expected failures of a
//! single star; centroiding and shape fitting fold them into the `msg` field of
//! their result objects instead.

use ndarray::ArrayView2;

use crate::config::MAX_RAD;

/// Errors raised while finding, centroiding or fitting stars.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GuideError {
    /// Malformed input: wrong guess arity, or arrays whose shapes disagree.
    #[error("invalid input shape: {0}")]
    InputShape(String),
    /// A parameter outside its valid domain (negative noise, etc.).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Too few usable pixels to compute robust statistics.
    #[error("too few points: {n_pts} < {min_pts}")]
    InsufficientData { n_pts: usize, min_pts: usize },
    /// The signal check did not find a real blob.
    #[error("No star found")]
    NoSignal,
    /// A search exceeded its iteration or displacement ceiling.
    #[error("{0}")]
    Convergence(String),
    /// Zero curvature or determinant, or a negative radicand.
    #[error("{0}")]
    NumericDegeneracy(String),
}

impl GuideError {
    /// True for errors that must surface to the caller rather than being
    /// folded into a result object.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::InputShape(_) | Self::InvalidParameter(_))
    }
}

pub type Result<T> = std::result::Result<T, GuideError>;

/// Check that an optional mask is congruent with the image it describes.
pub(crate) fn check_mask_shape(
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    name: &str,
) -> Result<()> {
    match mask {
        Some(m) if m.dim() != data.dim() => Err(GuideError::InputShape(format!(
            "{} shape {:?} does not match data shape {:?}",
            name,
            m.dim(),
            data.dim()
        ))),
        _ => Ok(()),
    }
}

/// Convert a caller-supplied position slice into a finite x,y pair.
pub(crate) fn xy_from_slice(xy: &[f64], name: &str) -> Result<[f64; 2]> {
    match xy {
        [x, y] if x.is_finite() && y.is_finite() => Ok([*x, *y]),
        [_, _] => Err(GuideError::InvalidParameter(format!(
            "{}={:?} must be finite",
            name, xy
        ))),
        _ => Err(GuideError::InputShape(format!(
            "{}={:?} must have 2 elements",
            name, xy
        ))),
    }
}

/// Check a caller-supplied radius: finite, positive and at most [`MAX_RAD`].
pub(crate) fn check_rad(rad: f64, name: &str) -> Result<()> {
    if rad.is_finite() && rad > 0.0 && rad <= MAX_RAD {
        Ok(())
    } else {
        Err(GuideError::InvalidParameter(format!(
            "{}={} must be in (0, {}]",
            name, rad, MAX_RAD
        )))
    }
}
