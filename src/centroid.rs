//! Centroiding by minimizing the weighted radial asymmetry.
//!
//! # Algorithm
//!
//! 1. Round the initial guess to the nearest pixel.
//! 2. Compute the asymmetry on the 3x3 grid of pixels around the current
//!    center, reusing cells computed on the previous step.
//! 3. If a neighbor is lower than the center, move the center there and
//!    repeat. Give up after [`MAX_ITER`] moves or once the center has
//!    drifted `rad` pixels from the initial guess.
//! 4. Fit a parabola through the center and its two neighbors along each
//!    axis to get the sub-pixel offset. The error along each axis is
//!    `sqrt(asymm / curvature)`.
//!
//! [`centroid`] wraps this with an optional signal check before and after,
//! so noise and cosmic rays are not reported as stars.

use ndarray::ArrayView2;
use tracing::{debug, trace, warn};

use crate::ccd::CcdInfo;
use crate::config::{condition_rad, CentroidConfig, MAX_ITER};
use crate::error::{check_mask_shape, check_rad, xy_from_slice, GuideError, Result};
use crate::observer::GuideContext;
use crate::signal::check_signal;
use crate::stats::ImageStats;

/// Result of centroiding one star.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CentroidResult {
    /// True if a centroid was found (and passed any signal check).
    pub is_ok: bool,
    /// Why the centroid failed; empty if `is_ok`.
    pub msg: String,
    /// Number of saturated unmasked pixels within `rad` of the center,
    /// or `None` if no saturation mask was given.
    pub n_sat: Option<usize>,
    /// Radius (pixels) actually used.
    pub rad: usize,
    /// Background statistics from the last signal check.
    pub im_stats: ImageStats,
    /// x,y centroid; NaN if the search failed.
    pub xy_ctr: [f64; 2],
    /// 1-sigma x,y error estimate.
    pub xy_err: [f64; 2],
    /// Weighted asymmetry at the center pixel.
    pub asymm: f64,
    /// Unmasked pixels within `rad` of the center pixel.
    pub pix: usize,
    /// Total counts within `rad` of the center pixel (background included).
    pub counts: f64,
}

impl CentroidResult {
    fn failed(rad: usize, msg: impl Into<String>, im_stats: ImageStats) -> Self {
        Self {
            is_ok: false,
            msg: msg.into(),
            n_sat: None,
            rad,
            im_stats,
            xy_ctr: [f64::NAN; 2],
            xy_err: [f64::NAN; 2],
            asymm: f64::NAN,
            pix: 0,
            counts: f64::NAN,
        }
    }
}

impl std::fmt::Display for CentroidResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.is_ok {
            return write!(f, "CentroidResult(failed: {})", self.msg);
        }
        write!(
            f,
            "CentroidResult(xyCtr=({:.2}, {:.2}), xyErr=({:.2}, {:.2}), counts={:.0}, pix={}, rad={}",
            self.xy_ctr[0],
            self.xy_ctr[1],
            self.xy_err[0],
            self.xy_err[1],
            self.counts,
            self.pix,
            self.rad
        )?;
        if let Some(n_sat) = self.n_sat {
            write!(f, ", nSat={}", n_sat)?;
        }
        write!(f, ")")
    }
}

// ─── Asymmetry walk ──────────────────────────────────────────────────────────

/// Asymmetry and totals at one trial center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    /// Weighted asymmetry; infinite if no pixels were usable.
    pub asymm: f64,
    pub counts: f64,
    pub pix: usize,
}

/// Progress of an [`AsymmetryWalk`].
#[derive(Debug, Clone, PartialEq)]
pub enum WalkState {
    Searching,
    Converged,
    Failed(GuideError),
}

/// Downhill walk over pixel centers toward the asymmetry minimum.
pub struct AsymmetryWalk<'a, 'd> {
    ctx: GuideContext<'a>,
    data: &'a ArrayView2<'d, f32>,
    mask: Option<&'a ArrayView2<'d, bool>>,
    ccd: &'a CcdInfo,
    rad: usize,
    start: [i64; 2],
    ctr: [i64; 2],
    grid: [[Option<GridCell>; 3]; 3],
    n_iter: usize,
    state: WalkState,
}

impl<'a, 'd> AsymmetryWalk<'a, 'd> {
    pub fn new(
        ctx: GuideContext<'a>,
        data: &'a ArrayView2<'d, f32>,
        mask: Option<&'a ArrayView2<'d, bool>>,
        ccd: &'a CcdInfo,
        ij_start: [i64; 2],
        rad: usize,
    ) -> Self {
        Self {
            ctx,
            data,
            mask,
            ccd,
            rad,
            start: ij_start,
            ctr: ij_start,
            grid: [[None; 3]; 3],
            n_iter: 0,
            state: WalkState::Searching,
        }
    }

    pub fn state(&self) -> &WalkState {
        &self.state
    }

    /// Current center pixel (i, j).
    pub fn ij_ctr(&self) -> [i64; 2] {
        self.ctr
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Advance one step. Does nothing once converged or failed.
    pub fn step(&mut self) -> &WalkState {
        if self.state != WalkState::Searching {
            return &self.state;
        }
        self.n_iter += 1;
        if self.n_iter > MAX_ITER {
            self.state = WalkState::Failed(GuideError::Convergence(format!(
                "could not find a star in {} iterations",
                MAX_ITER
            )));
            return &self.state;
        }

        let cells = self.fill_grid();
        let Some((mi, mj)) = min_cell(&cells) else {
            self.state = WalkState::Failed(GuideError::NumericDegeneracy(
                "no usable pixels near the initial guess".into(),
            ));
            return &self.state;
        };
        if (mi, mj) == (1, 1) {
            self.state = WalkState::Converged;
            return &self.state;
        }

        let di = mi as i64 - 1;
        let dj = mj as i64 - 1;
        self.ctr = [self.ctr[0] + di, self.ctr[1] + dj];
        let drift = [self.ctr[0] - self.start[0], self.ctr[1] - self.start[1]];
        let rad = self.rad as i64;
        if drift[0] * drift[0] + drift[1] * drift[1] >= rad * rad {
            self.state = WalkState::Failed(GuideError::Convergence(format!(
                "could not find star within {} pixels of the initial guess",
                self.rad
            )));
            return &self.state;
        }
        self.shift_grid(di, dj);
        trace!("centroid walk: iter {} moved to ij={:?}", self.n_iter, self.ctr);
        &self.state
    }

    /// Step until converged or failed; returns the final 3x3 grid.
    pub fn run(mut self) -> Result<ConvergedWalk> {
        loop {
            match self.step() {
                WalkState::Searching => continue,
                WalkState::Converged => break,
                WalkState::Failed(err) => return Err(err.clone()),
            }
        }
        // Converged right after fill_grid, so every cell is present
        let cells = self.fill_grid();
        Ok(ConvergedWalk {
            ij_ctr: self.ctr,
            cells,
            n_iter: self.n_iter,
        })
    }

    fn fill_grid(&mut self) -> [[GridCell; 3]; 3] {
        let mut cells = [[GridCell {
            asymm: f64::INFINITY,
            counts: 0.0,
            pix: 0,
        }; 3]; 3];
        for (gi, row) in self.grid.iter_mut().enumerate() {
            for (gj, slot) in row.iter_mut().enumerate() {
                let cell = match slot {
                    Some(cell) => *cell,
                    None => {
                        let ij = [self.ctr[0] + gi as i64 - 1, self.ctr[1] + gj as i64 - 1];
                        let a = self.ctx.profiles.weighted_asymmetry(
                            self.data, self.mask, ij, self.rad, self.ccd,
                        );
                        let cell = GridCell {
                            asymm: if a.tot_pts == 0 { f64::INFINITY } else { a.asymm },
                            counts: a.tot_counts,
                            pix: a.tot_pts,
                        };
                        *slot = Some(cell);
                        cell
                    }
                };
                cells[gi][gj] = cell;
            }
        }
        cells
    }

    /// Move the grid by (di, dj), keeping cells that overlap.
    fn shift_grid(&mut self, di: i64, dj: i64) {
        let old = self.grid;
        for gi in 0..3i64 {
            for gj in 0..3i64 {
                let (oi, oj) = (gi + di, gj + dj);
                self.grid[gi as usize][gj as usize] = if (0..3).contains(&oi) && (0..3).contains(&oj) {
                    old[oi as usize][oj as usize]
                } else {
                    None
                };
            }
        }
    }
}

/// Final state of a converged walk.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergedWalk {
    /// Center pixel, the minimum of `cells`.
    pub ij_ctr: [i64; 2],
    /// Asymmetry grid around `ij_ctr`, indexed `[di + 1][dj + 1]`.
    pub cells: [[GridCell; 3]; 3],
    pub n_iter: usize,
}

impl ConvergedWalk {
    /// Sub-pixel i,j position and its error from per-axis parabola fits.
    pub fn refine(&self) -> Result<([f64; 2], [f64; 2])> {
        let c = &self.cells;
        let y0 = c[1][1].asymm;
        let axes = [
            (c[0][1].asymm, c[2][1].asymm),
            (c[1][0].asymm, c[1][2].asymm),
        ];
        let mut ij_pos = [0.0; 2];
        let mut ij_err = [0.0; 2];
        for (ii, &(y_minus, y_plus)) in axes.iter().enumerate() {
            let a = 0.5 * (y_plus - 2.0 * y0 + y_minus);
            let b = 0.5 * (y_plus - y_minus);
            if !(a > 0.0) || !a.is_finite() || !b.is_finite() {
                return Err(GuideError::NumericDegeneracy(format!(
                    "asymmetry has no curvature along axis {}",
                    ii
                )));
            }
            ij_pos[ii] = self.ij_ctr[ii] as f64 - 0.5 * b / a;
            ij_err[ii] = (y0 / a).sqrt();
        }
        Ok((ij_pos, ij_err))
    }
}

/// Index of the smallest finite asymmetry; first in row-major order on ties.
fn min_cell(cells: &[[GridCell; 3]; 3]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (gi, row) in cells.iter().enumerate() {
        for (gj, cell) in row.iter().enumerate() {
            if !cell.asymm.is_finite() {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, _, v)) => cell.asymm < v,
            };
            if better {
                best = Some((gi, gj, cell.asymm));
            }
        }
    }
    best.map(|(gi, gj, _)| (gi, gj))
}

/// Count saturated, unmasked pixels within `rad` of pixel `ij_ctr`.
fn count_saturated(
    sat_mask: &ArrayView2<bool>,
    mask: Option<&ArrayView2<bool>>,
    ij_ctr: [i64; 2],
    rad: usize,
) -> usize {
    let (n_rows, n_cols) = sat_mask.dim();
    let r = rad as i64;
    let mut n_sat = 0;
    for i in (ij_ctr[0] - r).max(0)..=(ij_ctr[0] + r).min(n_rows as i64 - 1) {
        for j in (ij_ctr[1] - r).max(0)..=(ij_ctr[1] + r).min(n_cols as i64 - 1) {
            let (di, dj) = (i - ij_ctr[0], j - ij_ctr[1]);
            if di * di + dj * dj > r * r {
                continue;
            }
            let (iu, ju) = (i as usize, j as usize);
            if sat_mask[[iu, ju]] && !mask.is_some_and(|m| m[[iu, ju]]) {
                n_sat += 1;
            }
        }
    }
    n_sat
}

// ─── Public entry points ─────────────────────────────────────────────────────

/// Centroid a star near `xy_guess` without any signal check.
///
/// Returns `Err` only for malformed input; a failed search gives a result
/// with `is_ok == false`.
pub fn basic_centroid(
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    sat_mask: Option<&ArrayView2<bool>>,
    xy_guess: &[f64],
    rad: f64,
    ccd: &CcdInfo,
    config: &CentroidConfig,
) -> Result<CentroidResult> {
    basic_centroid_with(
        GuideContext::new(),
        data,
        mask,
        sat_mask,
        xy_guess,
        rad,
        ccd,
        config,
    )
}

/// [`basic_centroid`] with explicit collaborators.
#[allow(clippy::too_many_arguments)]
pub fn basic_centroid_with(
    ctx: GuideContext<'_>,
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    sat_mask: Option<&ArrayView2<bool>>,
    xy_guess: &[f64],
    rad: f64,
    ccd: &CcdInfo,
    config: &CentroidConfig,
) -> Result<CentroidResult> {
    check_mask_shape(data, mask, "mask")?;
    check_mask_shape(data, sat_mask, "satMask")?;
    let xy_guess = xy_from_slice(xy_guess, "xyGuess")?;
    check_rad(rad, "rad")?;
    let rad = condition_rad(rad);
    let conv = config.convention;

    ctx.observer.mark_search_circle(xy_guess, rad as f64);

    // Reborrow so the data and mask views share one lifetime
    let data_view = data.view();
    let mask_view = mask.map(|m| m.view());
    let ij_start = conv.ij_ind_from_xy_pos(xy_guess);
    let walk = AsymmetryWalk::new(ctx, &data_view, mask_view.as_ref(), ccd, ij_start, rad);
    let refined = walk
        .run()
        .and_then(|converged| converged.refine().map(|r| (converged, r)));
    let (converged, (ij_pos, ij_err)) = match refined {
        Ok(r) => r,
        Err(err) => {
            if config.verbosity >= 1 {
                warn!("basicCentroid failed near {:?}: {}", xy_guess, err);
            }
            return Ok(CentroidResult::failed(
                rad,
                err.to_string(),
                ImageStats::unknown(0),
            ));
        }
    };

    let center = converged.cells[1][1];
    let n_sat = sat_mask.map(|s| count_saturated(s, mask, converged.ij_ctr, rad));
    let xy_ctr = conv.xy_pos_from_ij_pos(ij_pos);
    let xy_err = [ij_err[1], ij_err[0]];
    if config.verbosity >= 2 {
        debug!(
            "basicCentroid: xyCtr={:?} xyErr={:?} after {} iterations",
            xy_ctr, xy_err, converged.n_iter
        );
    }
    ctx.observer.mark_centroid(xy_ctr, xy_err);

    Ok(CentroidResult {
        is_ok: true,
        msg: String::new(),
        n_sat,
        rad,
        im_stats: ImageStats::unknown(0),
        xy_ctr,
        xy_err,
        asymm: center.asymm,
        pix: center.pix,
        counts: center.counts,
    })
}

/// Centroid a star near `xy_guess`, checking for usable signal first and/or
/// after as set by `config.check_signal`.
///
/// Returns `Err` only for malformed input.
pub fn centroid(
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    sat_mask: Option<&ArrayView2<bool>>,
    xy_guess: &[f64],
    rad: f64,
    ccd: &CcdInfo,
    config: &CentroidConfig,
) -> Result<CentroidResult> {
    centroid_with(
        GuideContext::new(),
        data,
        mask,
        sat_mask,
        xy_guess,
        rad,
        ccd,
        config,
    )
}

/// [`centroid`] with explicit collaborators.
#[allow(clippy::too_many_arguments)]
pub fn centroid_with(
    ctx: GuideContext<'_>,
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    sat_mask: Option<&ArrayView2<bool>>,
    xy_guess: &[f64],
    rad: f64,
    ccd: &CcdInfo,
    config: &CentroidConfig,
) -> Result<CentroidResult> {
    check_mask_shape(data, mask, "mask")?;
    check_mask_shape(data, sat_mask, "satMask")?;
    let xy = xy_from_slice(xy_guess, "xyGuess")?;
    check_rad(rad, "rad")?;
    let (check_before, check_after) = config.check_signal;

    let mut im_stats = ImageStats::unknown(0);
    if check_before {
        let check = check_signal(
            data,
            mask,
            xy,
            rad,
            config.thresh,
            config.convention,
            config.verbosity,
        );
        if !check.signal_ok {
            return Ok(CentroidResult::failed(
                condition_rad(rad),
                GuideError::NoSignal.to_string(),
                check.im_stats,
            ));
        }
        im_stats = check.im_stats;
    }

    let mut res = basic_centroid_with(ctx, data, mask, sat_mask, xy_guess, rad, ccd, config)?;
    res.im_stats = im_stats;

    if res.is_ok && check_after {
        let check = check_signal(
            data,
            mask,
            res.xy_ctr,
            rad,
            config.thresh,
            config.convention,
            config.verbosity,
        );
        res.im_stats = check.im_stats;
        if !check.signal_ok {
            res.is_ok = false;
            res.msg = GuideError::NoSignal.to_string();
        }
    }
    Ok(res)
}
