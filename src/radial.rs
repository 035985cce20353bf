//! Radial profiles and the weighted radial asymmetry.
//!
//! Rings are indexed so the innermost three (r² = 0, 1, 2) are kept apart and
//! each later ring is one pixel wide:
//!
//! ```text
//! radInd(r²) = r²                      for r² < 3
//!            = floor(sqrt(r²) + 1.5)   otherwise
//! ```
//!
//! A radius of `rad` therefore produces `rad + 2` rings.

use ndarray::ArrayView2;

use crate::ccd::CcdInfo;

/// Mean, variance and pixel count of each ring around a center pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialProfile {
    /// Mean value of each ring (0 if the ring is empty).
    pub mean: Vec<f64>,
    /// Population variance of each ring (0 if the ring is empty).
    pub var: Vec<f64>,
    /// Number of unmasked pixels in each ring.
    pub n_pts: Vec<usize>,
    /// Sum of all unmasked pixels within the radius.
    pub tot_counts: f64,
    /// Number of unmasked pixels within the radius.
    pub tot_pts: usize,
}

impl RadialProfile {
    fn zeros(n_rings: usize) -> Self {
        Self {
            mean: vec![0.0; n_rings],
            var: vec![0.0; n_rings],
            n_pts: vec![0; n_rings],
            tot_counts: 0.0,
            tot_pts: 0,
        }
    }

    pub fn n_rings(&self) -> usize {
        self.n_pts.len()
    }
}

/// Weighted radial asymmetry at a trial center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Asymmetry {
    /// Sum over rings of variance / weight; small for a well centered star.
    pub asymm: f64,
    /// Sum of all unmasked pixels within the radius.
    pub tot_counts: f64,
    /// Number of unmasked pixels within the radius.
    pub tot_pts: usize,
}

/// Ring index of a squared radius.
pub fn rad_ind_by_rad_sq(rad_sq: usize) -> usize {
    if rad_sq < 3 {
        rad_sq
    } else {
        ((rad_sq as f64).sqrt() + 1.5).floor() as usize
    }
}

/// Nominal squared radius of each of `n_rings` rings.
pub fn rad_sq_by_rad_ind(n_rings: usize) -> Vec<f64> {
    (0..n_rings)
        .map(|ind| {
            if ind < 3 {
                ind as f64
            } else {
                let r = (ind - 1) as f64;
                r * r
            }
        })
        .collect()
}

/// Source of radial profiles.
///
/// The default implementation is [`RadialKernel`]; callers can substitute
/// their own (for example a faster native routine) via
/// [`crate::GuideContext`].
pub trait RadialProfileProvider: Sync {
    /// Profile of the `rad + 2` rings around pixel `ij_ctr`.
    ///
    /// Masked pixels (mask true) and pixels off the image are skipped;
    /// `ij_ctr` itself may lie off the image.
    fn radial_profile(
        &self,
        data: &ArrayView2<f32>,
        mask: Option<&ArrayView2<bool>>,
        ij_ctr: [i64; 2],
        rad: usize,
    ) -> RadialProfile;

    /// Weighted radial asymmetry around pixel `ij_ctr`.
    fn weighted_asymmetry(
        &self,
        data: &ArrayView2<f32>,
        mask: Option<&ArrayView2<bool>>,
        ij_ctr: [i64; 2],
        rad: usize,
        ccd: &CcdInfo,
    ) -> Asymmetry {
        let profile = self.radial_profile(data, mask, ij_ctr, rad);
        asymmetry_from_profile(&profile, ccd)
    }
}

/// Direct loop over the bounding box of the circle.
#[derive(Debug, Clone, Copy, Default)]
pub struct RadialKernel;

impl RadialProfileProvider for RadialKernel {
    fn radial_profile(
        &self,
        data: &ArrayView2<f32>,
        mask: Option<&ArrayView2<bool>>,
        ij_ctr: [i64; 2],
        rad: usize,
    ) -> RadialProfile {
        let mut prof = RadialProfile::zeros(rad + 2);
        let (n_rows, n_cols) = data.dim();
        let r = rad as i64;
        let max_rad_sq = rad * rad;

        let i_min = (ij_ctr[0] - r).max(0);
        let i_max = (ij_ctr[0] + r).min(n_rows as i64 - 1);
        let j_min = (ij_ctr[1] - r).max(0);
        let j_max = (ij_ctr[1] + r).min(n_cols as i64 - 1);

        for i in i_min..=i_max {
            let di = i - ij_ctr[0];
            for j in j_min..=j_max {
                let (iu, ju) = (i as usize, j as usize);
                if mask.is_some_and(|m| m[[iu, ju]]) {
                    continue;
                }
                let dj = j - ij_ctr[1];
                let rad_sq = (di * di + dj * dj) as usize;
                if rad_sq > max_rad_sq {
                    continue;
                }
                let ind = rad_ind_by_rad_sq(rad_sq);
                let v = f64::from(data[[iu, ju]]);
                prof.mean[ind] += v;
                prof.var[ind] += v * v;
                prof.n_pts[ind] += 1;
            }
        }

        // Sums to mean and population variance
        for ind in 0..prof.n_rings() {
            let n = prof.n_pts[ind];
            if n == 0 {
                continue;
            }
            prof.tot_counts += prof.mean[ind];
            prof.tot_pts += n;
            let mean = prof.mean[ind] / n as f64;
            prof.var[ind] = (prof.var[ind] / n as f64 - mean * mean).max(0.0);
            prof.mean[ind] = mean;
        }
        prof
    }
}

/// Weighted radial asymmetry of a profile.
///
/// Each ring with more than one pixel contributes `var / weight`, where
/// `weight = pixNoise * sqrt(2 (n - 1)) / n` is the expected spread of the
/// variance estimate for pure noise and `pixNoise² = (readNoise/gain)² +
/// (mean - bias)/gain`. Rings whose noise estimate is not positive are
/// skipped.
pub fn asymmetry_from_profile(profile: &RadialProfile, ccd: &CcdInfo) -> Asymmetry {
    let read_noise_sq = ccd.read_noise_adu().powi(2);
    let mut asymm = 0.0;
    for ((&mean, &var), &n) in profile
        .mean
        .iter()
        .zip(profile.var.iter())
        .zip(profile.n_pts.iter())
    {
        if n < 2 {
            continue;
        }
        let pix_noise_sq = read_noise_sq + (mean - ccd.bias) / ccd.ccd_gain;
        if pix_noise_sq <= 0.0 || !pix_noise_sq.is_finite() {
            continue;
        }
        let weight = pix_noise_sq.sqrt() * (2.0 * (n - 1) as f64).sqrt() / n as f64;
        asymm += var / weight;
    }
    Asymmetry {
        asymm,
        tot_counts: profile.tot_counts,
        tot_pts: profile.tot_pts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_ring_indices() {
        let inds: Vec<usize> = [0, 1, 2, 3, 4, 5, 8, 9, 10, 16]
            .iter()
            .map(|&r| rad_ind_by_rad_sq(r))
            .collect();
        assert_eq!(inds, vec![0, 1, 2, 3, 3, 3, 4, 4, 4, 5]);
        assert_eq!(rad_sq_by_rad_ind(6), vec![0.0, 1.0, 2.0, 4.0, 9.0, 16.0]);
    }

    #[test]
    fn test_flat_profile() {
        let data = Array2::<f32>::from_elem((20, 20), 7.0);
        let prof = RadialKernel.radial_profile(&data.view(), None, [10, 10], 3);
        assert_eq!(prof.n_rings(), 5);
        assert_eq!(prof.n_pts, vec![1, 4, 4, 12, 8]);
        assert_eq!(prof.tot_pts, 29);
        assert!((prof.tot_counts - 7.0 * 29.0).abs() < 1e-9);
        assert!(prof.var.iter().all(|&v| v == 0.0));
        assert!(prof.mean.iter().all(|&m| m == 7.0));
    }

    #[test]
    fn test_masked_and_off_image() {
        let data = Array2::<f32>::from_elem((10, 10), 1.0);
        let mut mask = Array2::from_elem((10, 10), false);
        mask[[0, 0]] = true;
        let prof = RadialKernel.radial_profile(&data.view(), Some(&mask.view()), [0, 0], 3);
        assert_eq!(prof.n_pts[0], 0);
        assert_eq!(prof.n_pts[1], 2);

        let off = RadialKernel.radial_profile(&data.view(), None, [-20, -20], 3);
        assert_eq!(off.tot_pts, 0);
    }

    #[test]
    fn test_asymmetry_lowest_at_center() {
        let ccd = CcdInfo::new(0.0, 5.0, 1.0);
        let star = Array2::from_shape_fn((31, 31), |(i, j)| {
            let r2 = (i as f64 - 15.0).powi(2) + (j as f64 - 15.0).powi(2);
            (100.0 + 1000.0 * (-r2 / 8.0).exp()) as f32
        });
        let a0 = RadialKernel.weighted_asymmetry(&star.view(), None, [15, 15], 6, &ccd);
        let a1 = RadialKernel.weighted_asymmetry(&star.view(), None, [16, 15], 6, &ccd);
        let a2 = RadialKernel.weighted_asymmetry(&star.view(), None, [15, 14], 6, &ccd);
        assert!(a0.asymm < a1.asymm, "{} !< {}", a0.asymm, a1.asymm);
        assert!((a1.asymm - a2.asymm).abs() < 1e-6 * a1.asymm);
        assert_eq!(a0.tot_pts, 113);
    }
}
