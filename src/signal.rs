//! Check for a real blob near a position before (or after) centroiding.
//!
//! The background is measured in an annulus around the search circle; the
//! search circle is then median filtered and thresholded at
//! `median + thresh * stdDev`. A star is accepted if any 8-connected blob
//! above threshold is at least 2 pixels wide and 2 pixels tall.

use ndarray::{Array2, ArrayView2};
use tracing::{debug, warn};

use crate::config::{condition_rad, MIN_PIX_FOR_STATS, OUTER_RAD_ADD};
use crate::filter::median_filter_3x3;
use crate::label::label_8_connected;
use crate::position::PositionConvention;
use crate::stats::{sky_stats_from_values, ImageStats};
use crate::subframe::SubFrame;

/// Outcome of a signal check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalCheck {
    /// True if a usable blob was found.
    pub signal_ok: bool,
    /// Background statistics; unknown if there were too few pixels.
    pub im_stats: ImageStats,
}

/// Smallest blob extent (pixels, on both axes) accepted as a star.
const MIN_BLOB_SIZE: usize = 2;

/// Check whether there is usable signal within `rad` of `xy_ctr`.
///
/// `mask` must match `data` in shape; callers validate this.
pub fn check_signal(
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    xy_ctr: [f64; 2],
    rad: f64,
    thresh: f64,
    convention: PositionConvention,
    verbosity: u8,
) -> SignalCheck {
    if !(xy_ctr[0].is_finite() && xy_ctr[1].is_finite()) {
        return SignalCheck {
            signal_ok: false,
            im_stats: ImageStats::unknown(0),
        };
    }
    let rad = condition_rad(rad);
    let outer_rad = rad + OUTER_RAD_ADD;
    let box_size = (2 * outer_rad) as f64;
    let (n_rows, n_cols) = data.dim();
    let sub = SubFrame::from_center(
        [n_rows, n_cols],
        xy_ctr,
        [box_size, box_size],
        convention,
    );
    let sub_data = sub.view(data.view());
    let sub_mask = mask.map(|m| sub.view(m.view()));
    let is_masked = |i: usize, j: usize| sub_mask.as_ref().is_some_and(|m| m[[i, j]]);

    let n_unmasked = match &sub_mask {
        Some(m) => m.iter().filter(|&&masked| !masked).count(),
        None => sub_data.len(),
    };
    if n_unmasked < MIN_PIX_FOR_STATS {
        if verbosity >= 1 {
            warn!(
                "checkSignal: only {} unmasked pixels near {:?}",
                n_unmasked, xy_ctr
            );
        }
        return SignalCheck {
            signal_ok: false,
            im_stats: ImageStats::unknown(n_unmasked),
        };
    }

    let sub_ctr = sub.sub_ij_from_full_ij(convention.ij_pos_from_xy_pos(xy_ctr));
    let rad_sq = (rad * rad) as f64;
    let in_circle = |i: usize, j: usize| {
        let di = i as f64 - sub_ctr[0];
        let dj = j as f64 - sub_ctr[1];
        di * di + dj * dj <= rad_sq
    };

    // ── Background sample: the annulus, or the whole box if that is too small ──
    let mut background: Vec<f64> = sub_data
        .indexed_iter()
        .filter(|&((i, j), _)| !is_masked(i, j) && !in_circle(i, j))
        .map(|(_, &v)| f64::from(v))
        .collect();
    if background.len() < OUTER_RAD_ADD * OUTER_RAD_ADD {
        background = sub_data
            .indexed_iter()
            .filter(|&((i, j), _)| !is_masked(i, j))
            .map(|(_, &v)| f64::from(v))
            .collect();
    }
    let im_stats = match sky_stats_from_values(background, thresh) {
        Ok(stats) => stats,
        Err(err) => {
            if verbosity >= 1 {
                warn!("checkSignal: no background statistics near {:?}: {}", xy_ctr, err);
            }
            return SignalCheck {
                signal_ok: false,
                im_stats: ImageStats::unknown(n_unmasked),
            };
        }
    };

    // ── Inner circle with masked and outside pixels set to the median ──
    let (sub_rows, sub_cols) = sub_data.dim();
    let inner = Array2::from_shape_fn((sub_rows, sub_cols), |(i, j)| {
        if in_circle(i, j) && !is_masked(i, j) {
            f64::from(sub_data[[i, j]])
        } else {
            im_stats.med
        }
    });
    let smoothed = median_filter_3x3(&inner.view());
    let above = smoothed.mapv(|v| v > im_stats.data_cut);
    let boxes = label_8_connected(&above.view()).bounding_boxes();

    let signal_ok = boxes
        .iter()
        .any(|b| b.ij_size().iter().all(|&s| s >= MIN_BLOB_SIZE));
    if verbosity >= 2 {
        debug!(
            "checkSignal at {:?}: {} blobs, signal_ok={}, {}",
            xy_ctr,
            boxes.len(),
            signal_ok,
            im_stats
        );
    }
    SignalCheck {
        signal_ok,
        im_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::fake_star;

    #[test]
    fn test_star_found() {
        let conv = PositionConvention::Centered;
        let mut data = fake_star([64, 64], [30.0, 32.0], 2.0, 1000.0, conv);
        // Gentle gradient so the background spread is not zero
        data.indexed_iter_mut()
            .for_each(|((i, j), v)| *v += 100.0 + ((i * 7 + j * 3) % 5) as f32);
        let check = check_signal(&data.view(), None, [30.0, 32.0], 5.0, 3.0, conv, 0);
        assert!(check.signal_ok);
        assert!(check.im_stats.is_known());
        // The annulus still holds some of the star's wings
        assert!(
            check.im_stats.med > 100.0 && check.im_stats.med < 120.0,
            "{}",
            check.im_stats
        );
    }

    #[test]
    fn test_empty_sky() {
        let conv = PositionConvention::Centered;
        let data = Array2::from_shape_fn((64, 64), |(i, j)| 100.0 + ((i * 7 + j * 3) % 5) as f32);
        let check = check_signal(&data.view(), None, [30.0, 32.0], 5.0, 3.0, conv, 0);
        assert!(!check.signal_ok);
    }

    #[test]
    fn test_off_image() {
        let conv = PositionConvention::Centered;
        let data = Array2::<f32>::from_elem((64, 64), 100.0);
        let check = check_signal(&data.view(), None, [500.0, 500.0], 5.0, 3.0, conv, 0);
        assert!(!check.signal_ok);
        assert_eq!(check.im_stats.n_pts, 0);
        assert!(!check.im_stats.is_known());
    }

    #[test]
    fn test_non_finite_or_far_center() {
        let conv = PositionConvention::Centered;
        let data = Array2::<f32>::from_elem((64, 64), 100.0);
        for xy in [[f64::NAN, 10.0], [f64::INFINITY, 10.0], [1e300, 10.0]] {
            let check = check_signal(&data.view(), None, xy, 5.0, 3.0, conv, 0);
            assert!(!check.signal_ok, "{xy:?}");
        }
    }
}
