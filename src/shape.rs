//! Star shape: fit a double-Gaussian to the radial profile.
//!
//! The model is
//!
//! ```text
//! value(r²) = bkgnd + ampl * (exp(-0.5 w r²) + 0.1 exp(-0.125 w r²)) / 1.1
//! w = (FWHM_PER_SIGMA / fwhm)²
//! ```
//!
//! For each trial FWHM the amplitude and background are found by weighted
//! linear least squares, with ring weights `nPts² / variance`. The FWHM is
//! scanned geometrically from 1 pixel up to 1.5 times the radius, then
//! refined with Brent's method around the best scan point.
//!
//! The profile is measured around the nearest pixel, not the true center,
//! which broadens it; the fitted width is corrected for that offset.

use nalgebra::{Matrix2, Vector2};
use ndarray::ArrayView2;
use tracing::{debug, trace, warn};

use crate::config::{condition_rad, ShapeConfig, FWHM_PER_SIGMA};
use crate::error::{check_mask_shape, check_rad, xy_from_slice, GuideError, Result};
use crate::minimize::{brent, BrentOptions};
use crate::observer::GuideContext;
use crate::radial::{rad_sq_by_rad_ind, RadialProfile};

/// Relative amplitude of the wide component.
const HALO_AMPL: f64 = 0.1;
/// First trial FWHM (pixels).
const MIN_FWHM: f64 = 1.0;
/// Ratio between successive trial FWHMs.
const FWHM_STEP: f64 = 1.1;
/// Trial FWHMs stop below this multiple of the radius.
const MAX_FWHM_PER_RAD: f64 = 1.5;
/// Ring variances at or below this fraction of the largest count as zero.
/// Zero variances are raised to the smallest remaining ring variance.
const VAR_ZERO_FRAC: f64 = 1.0e-10;

/// Result of fitting a star's shape.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShapeResult {
    pub is_ok: bool,
    /// Why the fit failed; empty if `is_ok`.
    pub msg: String,
    /// Peak height above background (ADU); NaN on failure.
    pub ampl: f64,
    /// Background level (ADU); NaN on failure.
    pub bkgnd: f64,
    /// Full width at half maximum (pixels); NaN on failure.
    pub fwhm: f64,
    /// Weighted sum of squared residuals divided by the number of pixels.
    pub chi_sq: f64,
}

impl ShapeResult {
    fn failed(msg: impl Into<String>) -> Self {
        Self {
            is_ok: false,
            msg: msg.into(),
            ampl: f64::NAN,
            bkgnd: f64::NAN,
            fwhm: f64::NAN,
            chi_sq: f64::NAN,
        }
    }
}

impl std::fmt::Display for ShapeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.is_ok {
            return write!(f, "ShapeResult(failed: {})", self.msg);
        }
        write!(
            f,
            "ShapeResult(fwhm={:.2}, ampl={:.1}, bkgnd={:.1}, chiSq={:.3})",
            self.fwhm, self.ampl, self.bkgnd, self.chi_sq
        )
    }
}

/// Best fit of the model to a radial profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileFit {
    pub ampl: f64,
    pub bkgnd: f64,
    pub fwhm: f64,
    pub chi_sq: f64,
}

/// Normalized model value at squared radius `rad_sq`.
fn model(rad_sq: f64, fwhm: f64) -> f64 {
    let w = (FWHM_PER_SIGMA / fwhm).powi(2);
    ((-0.5 * w * rad_sq).exp() + HALO_AMPL * (-0.125 * w * rad_sq).exp()) / (1.0 + HALO_AMPL)
}

/// Rings prepared for fitting.
struct WeightedProfile {
    rad_sq: Vec<f64>,
    value: Vec<f64>,
    weight: Vec<f64>,
    tot_pts: f64,
}

impl WeightedProfile {
    fn new(profile: &RadialProfile) -> Self {
        let used: Vec<f64> = profile
            .var
            .iter()
            .zip(profile.n_pts.iter())
            .filter(|(_, &n)| n > 0)
            .map(|(&v, _)| v)
            .collect();
        let max_var = used.iter().copied().fold(0.0, f64::max);
        // Smallest variance that is not numerically zero; 1.0 if all are zero
        let var_floor = used
            .iter()
            .copied()
            .filter(|&v| v > VAR_ZERO_FRAC * max_var)
            .fold(f64::INFINITY, f64::min);
        let var_floor = if var_floor.is_finite() { var_floor } else { 1.0 };
        let weight = profile
            .var
            .iter()
            .zip(profile.n_pts.iter())
            .map(|(&v, &n)| {
                let n = n as f64;
                n * n / v.max(var_floor)
            })
            .collect();
        Self {
            rad_sq: rad_sq_by_rad_ind(profile.n_rings()),
            value: profile.mean.clone(),
            weight,
            tot_pts: profile.n_pts.iter().sum::<usize>() as f64,
        }
    }

    /// Amplitude, background and chi² at a fixed FWHM.
    fn fit_at(&self, fwhm: f64) -> Result<(f64, f64, f64)> {
        let m: Vec<f64> = self.rad_sq.iter().map(|&r2| model(r2, fwhm)).collect();
        let (mut sw, mut swm, mut swmm, mut swp, mut swmp) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for ((&mk, &pk), &wk) in m.iter().zip(self.value.iter()).zip(self.weight.iter()) {
            sw += wk;
            swm += wk * mk;
            swmm += wk * mk * mk;
            swp += wk * pk;
            swmp += wk * mk * pk;
        }
        let normal = Matrix2::new(swmm, swm, swm, sw);
        let det = normal.determinant();
        if !(det.abs() > f64::EPSILON * swmm * sw) {
            return Err(GuideError::NumericDegeneracy(format!(
                "profile cannot constrain amplitude and background (det={:.3e})",
                det
            )));
        }
        let sol = normal
            .lu()
            .solve(&Vector2::new(swmp, swp))
            .ok_or_else(|| GuideError::NumericDegeneracy("singular profile fit".into()))?;
        let (ampl, bkgnd) = (sol[0], sol[1]);

        let chi_sq = m
            .iter()
            .zip(self.value.iter())
            .zip(self.weight.iter())
            .map(|((&mk, &pk), &wk)| wk * (pk - ampl * mk - bkgnd).powi(2))
            .sum::<f64>()
            / self.tot_pts;
        Ok((ampl, bkgnd, chi_sq))
    }
}

/// Fit the double-Gaussian model to a radial profile of `rad + 2` rings.
pub fn fit_rad_profile(profile: &RadialProfile, verbosity: u8) -> Result<ProfileFit> {
    if profile.tot_pts == 0 {
        return Err(GuideError::InsufficientData {
            n_pts: 0,
            min_pts: 1,
        });
    }
    let rad = profile.n_rings().saturating_sub(2) as f64;
    let prof = WeightedProfile::new(profile);

    // ── Coarse scan ──
    let max_fwhm = MAX_FWHM_PER_RAD * rad;
    let mut fwhms = Vec::new();
    let mut chi_sqs = Vec::new();
    let mut best: Option<usize> = None;
    let mut fwhm = MIN_FWHM;
    while fwhm < max_fwhm {
        let (ampl, _, chi_sq) = prof.fit_at(fwhm)?;
        if verbosity >= 3 {
            trace!("fwhm={:.3} ampl={:.2} chiSq={:.4}", fwhm, ampl, chi_sq);
        }
        let chi_sq = if ampl > 0.0 { chi_sq } else { f64::INFINITY };
        let better = match best {
            None => true,
            Some(i) => chi_sq < chi_sqs[i],
        };
        if chi_sq.is_finite() && better {
            best = Some(fwhms.len());
        }
        fwhms.push(fwhm);
        chi_sqs.push(chi_sq);
        fwhm *= FWHM_STEP;
    }

    let Some(ind) = best else {
        return Err(GuideError::Convergence(
            "no fit with a positive amplitude".into(),
        ));
    };
    if ind == 0 || ind + 1 >= fwhms.len() {
        return Err(GuideError::Convergence(format!(
            "best fwhm {:.2} is at the edge of the search range",
            fwhms[ind]
        )));
    }

    // ── Refine ──
    let objective = |fwhm: f64| match prof.fit_at(fwhm) {
        Ok((ampl, _, chi_sq)) if ampl > 0.0 => chi_sq,
        _ => f64::INFINITY,
    };
    let min = brent(
        objective,
        fwhms[ind - 1],
        fwhms[ind],
        fwhms[ind + 1],
        &BrentOptions::default(),
    )?;
    let (ampl, bkgnd, chi_sq) = prof.fit_at(min.x)?;
    Ok(ProfileFit {
        ampl,
        bkgnd,
        fwhm: min.x,
        chi_sq,
    })
}

/// Fit the shape of the star centered at `xy_ctr`.
///
/// Returns `Err` only for malformed input; a failed fit gives a result with
/// `is_ok == false` and NaN fields.
pub fn star_shape(
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    xy_ctr: &[f64],
    rad: f64,
    config: &ShapeConfig,
) -> Result<ShapeResult> {
    star_shape_with(GuideContext::new(), data, mask, xy_ctr, rad, config)
}

/// [`star_shape`] with explicit collaborators.
pub fn star_shape_with(
    ctx: GuideContext<'_>,
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    xy_ctr: &[f64],
    rad: f64,
    config: &ShapeConfig,
) -> Result<ShapeResult> {
    check_mask_shape(data, mask, "mask")?;
    let xy_ctr = xy_from_slice(xy_ctr, "xyCtr")?;
    check_rad(rad, "rad")?;
    let conv = config.convention;
    let rad = condition_rad(rad);

    let ij_ind = conv.ij_ind_from_xy_pos(xy_ctr);
    let ij_pos = conv.ij_pos_from_xy_pos(xy_ctr);
    let off_sq: f64 = (0..2).map(|ii| (ij_pos[ii] - ij_ind[ii] as f64).powi(2)).sum();

    let profile = ctx.profiles.radial_profile(data, mask, ij_ind, rad);
    let fit = match fit_rad_profile(&profile, config.verbosity) {
        Ok(fit) => fit,
        Err(err) => {
            if config.verbosity >= 1 {
                warn!("starShape failed at {:?}: {}", xy_ctr, err);
            }
            return Ok(ShapeResult::failed(err.to_string()));
        }
    };

    // Remove the broadening from measuring about the nearest pixel
    let raw_sigma = fit.fwhm / FWHM_PER_SIGMA;
    let corr_sigma_sq = raw_sigma * raw_sigma - 0.5 * off_sq;
    if corr_sigma_sq < 0.0 {
        let err = GuideError::NumericDegeneracy(format!(
            "could not correct fwhm {:.3} for a center offset of {:.3} pixels",
            fit.fwhm,
            off_sq.sqrt()
        ));
        if config.verbosity >= 1 {
            warn!("starShape failed at {:?}: {}", xy_ctr, err);
        }
        return Ok(ShapeResult::failed(err.to_string()));
    }
    let fwhm = corr_sigma_sq.sqrt() * FWHM_PER_SIGMA;

    if config.verbosity >= 2 {
        debug!(
            "starShape at {:?}: fwhm={:.3} (raw {:.3}) ampl={:.1} bkgnd={:.1} chiSq={:.3}",
            xy_ctr, fwhm, fit.fwhm, fit.ampl, fit.bkgnd, fit.chi_sq
        );
    }
    Ok(ShapeResult {
        is_ok: true,
        msg: String::new(),
        ampl: fit.ampl,
        bkgnd: fit.bkgnd,
        fwhm,
        chi_sq: fit.chi_sq,
    })
}
