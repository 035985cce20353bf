//! Synthetic star images for testing.
//!
//! Stars use the same double-Gaussian profile the shape fitter assumes:
//! a core of width `sigma` plus a halo twice as wide at one tenth the
//! amplitude, normalized so the peak equals `ampl`.

use ndarray::{Array2, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};

use crate::ccd::{CcdInfo, SAT_LEVEL_16BIT};
use crate::error::{GuideError, Result};
use crate::position::PositionConvention;

/// Relative amplitude of the halo.
const HALO_AMPL: f64 = 0.1;

/// Value of the double-Gaussian profile at squared radius `rad_sq`.
pub fn double_gaussian(rad_sq: f64, sigma: f64, ampl: f64) -> f64 {
    let x = -rad_sq / (2.0 * sigma * sigma);
    ampl * (x.exp() + HALO_AMPL * (0.25 * x).exp()) / (1.0 + HALO_AMPL)
}

/// Noise-free image of one star centered at `xy_ctr` on a zero background.
pub fn fake_star(
    shape: [usize; 2],
    xy_ctr: [f64; 2],
    sigma: f64,
    ampl: f64,
    convention: PositionConvention,
) -> Array2<f32> {
    let ij_ctr = convention.ij_pos_from_xy_pos(xy_ctr);
    Array2::from_shape_fn((shape[0], shape[1]), |(i, j)| {
        let di = i as f64 - ij_ctr[0];
        let dj = j as f64 - ij_ctr[1];
        double_gaussian(di * di + dj * dj, sigma, ampl).min(SAT_LEVEL_16BIT) as f32
    })
}

/// Add sky, photon noise, bias and read noise to a noise-free image.
///
/// Each pixel becomes `Poisson(gain * (data + sky)) / gain + Normal(bias,
/// readNoise / gain)`, rounded and clipped to `[0, 65535]`.
pub fn add_noise<R: Rng + ?Sized>(
    data: &ArrayView2<f32>,
    sky: f64,
    ccd: &CcdInfo,
    rng: &mut R,
) -> Result<Array2<f32>> {
    if !(ccd.ccd_gain > 0.0) {
        return Err(GuideError::InvalidParameter(format!(
            "ccdGain={} must be positive",
            ccd.ccd_gain
        )));
    }
    let read_noise = Normal::new(ccd.bias, ccd.read_noise_adu()).map_err(|e| {
        GuideError::InvalidParameter(format!("readNoise={}: {}", ccd.read_noise, e))
    })?;

    let mut out = Array2::<f32>::zeros(data.dim());
    for (o, &v) in out.iter_mut().zip(data.iter()) {
        let electrons = (f64::from(v) + sky) * ccd.ccd_gain;
        let photons = match Poisson::new(electrons) {
            Ok(p) => p.sample(rng),
            Err(_) => 0.0,
        };
        let adu = photons / ccd.ccd_gain + read_noise.sample(rng);
        *o = adu.round().clamp(0.0, SAT_LEVEL_16BIT) as f32;
    }
    Ok(out)
}
