//! Find and centroid all stars in a frame.
//!
//! # Algorithm
//!
//! 1. **Background**: robust sky statistics of the unmasked pixels give the
//!    median and `dataCut = median + thresh * stdDev`.
//! 2. **Smoothing**: masked pixels are set to the median and the frame is
//!    3x3 median filtered, which removes single-pixel hot pixels and cosmic
//!    rays.
//! 3. **Detection**: pixels above `dataCut` are grouped into 8-connected
//!    blobs. Blobs only one pixel wide or tall are discarded.
//! 4. **Centroiding**: each blob is centroided from the center of its
//!    bounding box, with signal checks before and after. Failures are
//!    dropped.
//! 5. **Ordering**: stars are returned brightest first (by total counts);
//!    equal counts keep detection order.
//!
//! # Example
//!
//! ```no_run
//! use ndarray::Array2;
//! use starguide::{find_stars, CcdInfo, FindStarsConfig};
//!
//! let data = Array2::<f32>::zeros((512, 512));
//! let ccd = CcdInfo::new(2176.0, 19.0, 2.1);
//! let found = find_stars(&data.view(), None, None, &ccd, &FindStarsConfig::default()).unwrap();
//! for star in &found.stars {
//!     println!("{}", star);
//! }
//! ```

use ndarray::ArrayView2;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::ccd::CcdInfo;
use crate::centroid::{centroid_with, CentroidResult};
use crate::config::FindStarsConfig;
use crate::error::{check_mask_shape, check_rad, GuideError, Result};
use crate::filter::{fill_masked, median_filter_3x3};
use crate::label::{label_8_connected, BoundingBox};
use crate::observer::GuideContext;
use crate::stats::{sky_stats, ImageStats};

/// Stars found in a frame.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FoundStars {
    /// Successfully centroided stars, brightest first.
    pub stars: Vec<CentroidResult>,
    /// Statistics of the whole frame.
    pub im_stats: ImageStats,
}

impl FoundStars {
    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }
}

/// A blob that will be centroided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Initial x,y guess: the center of the blob's bounding box.
    pub xy_guess: [f64; 2],
    /// Bounding box size (x, y).
    pub xy_size: [f64; 2],
    /// Centroid search radius.
    pub rad: f64,
}

/// Find all stars in `data`.
///
/// `mask` (true = ignore) and `sat_mask` (true = saturated) must match
/// `data` in shape. Returns `Err` for mismatched shapes, or if the frame has
/// too few unmasked pixels for background statistics.
pub fn find_stars(
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    sat_mask: Option<&ArrayView2<bool>>,
    ccd: &CcdInfo,
    config: &FindStarsConfig,
) -> Result<FoundStars> {
    find_stars_with(GuideContext::new(), data, mask, sat_mask, ccd, config)
}

/// Find all stars in row-major raw pixel data.
///
/// `mask`, if given, must have the same length as `pixels`.
pub fn find_stars_from_raw(
    pixels: &[f32],
    width: usize,
    height: usize,
    mask: Option<&[bool]>,
    ccd: &CcdInfo,
    config: &FindStarsConfig,
) -> Result<FoundStars> {
    let data = ArrayView2::from_shape((height, width), pixels).map_err(|_| {
        GuideError::InputShape(format!(
            "Pixel data length ({}) does not match width*height ({}x{}={})",
            pixels.len(),
            width,
            height,
            width * height
        ))
    })?;
    let mask = mask
        .map(|m| {
            ArrayView2::from_shape((height, width), m).map_err(|_| {
                GuideError::InputShape(format!(
                    "Mask length ({}) does not match width*height ({})",
                    m.len(),
                    width * height
                ))
            })
        })
        .transpose()?;
    let sat_mask = ccd.saturation_mask(&data);
    let sat_view = sat_mask.as_ref().map(|s| s.view());
    find_stars(&data, mask.as_ref(), sat_view.as_ref(), ccd, config)
}

/// [`find_stars`] with explicit collaborators.
pub fn find_stars_with(
    ctx: GuideContext<'_>,
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    sat_mask: Option<&ArrayView2<bool>>,
    ccd: &CcdInfo,
    config: &FindStarsConfig,
) -> Result<FoundStars> {
    check_mask_shape(data, mask, "mask")?;
    check_mask_shape(data, sat_mask, "satMask")?;
    match config.rad {
        Some(rad) => check_rad(rad, "rad")?,
        None if !(config.rad_mult.is_finite() && config.rad_mult > 0.0) => {
            return Err(GuideError::InvalidParameter(format!(
                "radMult={} must be positive",
                config.rad_mult
            )));
        }
        None => {}
    }
    ctx.observer.show_frame(data, mask);

    // ── Step 1: background ──
    let im_stats = sky_stats(data, mask, config.thresh)?;
    if config.verbosity >= 2 {
        debug!("findStars: {}", im_stats);
    }

    // ── Steps 2-3: smooth, threshold and label ──
    let smoothed = median_filter_3x3(&fill_masked(data, mask, im_stats.med).view());
    let above = smoothed.mapv(|v| v > im_stats.data_cut);
    let boxes = label_8_connected(&above.view()).bounding_boxes();
    let candidates = select_candidates(&boxes, config);
    if config.verbosity >= 2 {
        debug!(
            "findStars: {} blobs, {} candidates",
            boxes.len(),
            candidates.len()
        );
    }
    for cand in &candidates {
        ctx.observer.mark_candidate(cand.xy_guess, cand.xy_size);
    }

    // ── Step 4: centroid each candidate ──
    let centroid_config = config.centroid_config();
    let results: Vec<Result<CentroidResult>> = candidates
        .par_iter()
        .map(|cand| {
            centroid_with(
                ctx,
                data,
                mask,
                sat_mask,
                &cand.xy_guess,
                cand.rad,
                ccd,
                &centroid_config,
            )
        })
        .collect();

    let mut stars = Vec::with_capacity(results.len());
    for (cand, res) in candidates.iter().zip(results) {
        let res = res?;
        if res.is_ok {
            stars.push(res);
        } else if config.verbosity >= 1 {
            warn!(
                "findStars: centroid at {:?} failed: {}",
                cand.xy_guess, res.msg
            );
        }
    }

    // ── Step 5: brightest first (stable, so ties keep detection order) ──
    stars.sort_by(|a, b| b.counts.total_cmp(&a.counts));

    Ok(FoundStars { stars, im_stats })
}

/// Turn labeled blobs into centroid candidates, dropping blobs that are a
/// single pixel wide or tall.
pub fn select_candidates(boxes: &[BoundingBox], config: &FindStarsConfig) -> Vec<Candidate> {
    let conv = config.convention;
    boxes
        .iter()
        .filter_map(|b| {
            let ij_size = b.ij_size();
            let xy_guess = conv.xy_pos_from_ij_pos(b.ij_ctr());
            if ij_size[0] == 1 || ij_size[1] == 1 {
                if config.verbosity >= 1 {
                    warn!(
                        "findStars: skipping blob at {:?}: size {}x{} is too thin",
                        xy_guess, ij_size[1], ij_size[0]
                    );
                }
                return None;
            }
            let max_size = ij_size[0].max(ij_size[1]) as f64;
            Some(Candidate {
                xy_guess,
                xy_size: [ij_size[1] as f64, ij_size[0] as f64],
                rad: config.rad.unwrap_or(max_size * config.rad_mult / 2.0),
            })
        })
        .collect()
}
