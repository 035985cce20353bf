//! Integration tests: build synthetic guide frames with known stars, then
//! verify that star finding, centroiding and shape fitting recover them.

use std::sync::Mutex;

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use starguide::config::FWHM_PER_SIGMA;
use starguide::fake::{add_noise, fake_star};
use starguide::{
    basic_centroid, centroid, find_stars, find_stars_with, star_shape, CcdInfo, CentroidConfig,
    FindStarsConfig, GuideContext, GuideObserver, PositionConvention, RadialKernel,
    RadialProfile, RadialProfileProvider, ShapeConfig,
};

const CONV: PositionConvention = PositionConvention::Centered;

fn guide_ccd() -> CcdInfo {
    CcdInfo::new(200.0, 10.0, 2.0)
}

/// Two stars, a hot pixel and a hot column segment on a noisy 80x96 frame.
fn noisy_two_star_frame(seed: u64) -> Array2<f32> {
    let mut clean = fake_star([80, 96], [24.3, 20.6], 1.8, 3000.0, CONV);
    clean += &fake_star([80, 96], [70.2, 55.4], 1.8, 900.0, CONV);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = add_noise(&clean.view(), 100.0, &guide_ccd(), &mut rng).unwrap();
    data[[40, 10]] = 5000.0;
    for i in 60..70 {
        data[[i, 85]] = 3000.0;
    }
    data
}

fn quiet_config() -> FindStarsConfig {
    FindStarsConfig {
        verbosity: 0,
        ..Default::default()
    }
}

#[test]
fn test_find_stars_recovers_both_stars() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let data = noisy_two_star_frame(7);
    let found = find_stars(&data.view(), None, None, &guide_ccd(), &quiet_config()).unwrap();

    println!("{}", found.im_stats);
    for star in &found.stars {
        println!("  {}", star);
    }
    assert_eq!(found.len(), 2, "hot pixel and column must not be detected");
    assert!((found.im_stats.med - 300.0).abs() < 5.0);

    let bright = &found.stars[0];
    let faint = &found.stars[1];
    assert!(bright.counts > faint.counts);
    assert!(
        (bright.xy_ctr[0] - 24.3).abs() < 0.2 && (bright.xy_ctr[1] - 20.6).abs() < 0.2,
        "bright star at {:?}",
        bright.xy_ctr
    );
    assert!(
        (faint.xy_ctr[0] - 70.2).abs() < 0.3 && (faint.xy_ctr[1] - 55.4).abs() < 0.3,
        "faint star at {:?}",
        faint.xy_ctr
    );
    assert!(found.stars.iter().all(|s| s.is_ok && s.n_sat.is_none()));
}

#[test]
fn test_find_stars_equal_counts_keep_detection_order() {
    // Background pattern with period 5 so both stars see identical pixels
    let mut data = fake_star([40, 80], [20.5, 20.5], 2.0, 1000.0, CONV);
    data += &fake_star([40, 80], [60.5, 20.5], 2.0, 1000.0, CONV);
    data.indexed_iter_mut()
        .for_each(|((i, j), v)| *v += 100.0 + ((i * 7 + j * 3) % 5) as f32);
    let ccd = CcdInfo::new(0.0, 5.0, 1.0);

    let found = find_stars(&data.view(), None, None, &ccd, &quiet_config()).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found.stars[0].counts, found.stars[1].counts);
    assert!(found.stars[0].xy_ctr[0] < found.stars[1].xy_ctr[0]);
}

/// Delegates to the built-in kernel but reports a perfectly symmetric
/// (useless) profile for the left half of the frame.
struct LeftBlindProfiles;

impl RadialProfileProvider for LeftBlindProfiles {
    fn radial_profile(
        &self,
        data: &ArrayView2<f32>,
        mask: Option<&ArrayView2<bool>>,
        ij_ctr: [i64; 2],
        rad: usize,
    ) -> RadialProfile {
        let mut prof = RadialKernel.radial_profile(data, mask, ij_ctr, rad);
        if ij_ctr[1] < 48 {
            prof.var.iter_mut().for_each(|v| *v = 0.0);
        }
        prof
    }
}

#[test]
fn test_find_stars_drops_failed_candidates() {
    let data = noisy_two_star_frame(11);
    let ctx = GuideContext::new().with_profiles(&LeftBlindProfiles);
    let found =
        find_stars_with(ctx, &data.view(), None, None, &guide_ccd(), &quiet_config()).unwrap();
    assert_eq!(found.len(), 1);
    assert!((found.stars[0].xy_ctr[0] - 70.2).abs() < 0.3);
}

#[derive(Default)]
struct RecordingObserver {
    candidates: Mutex<Vec<[f64; 2]>>,
    centroids: Mutex<Vec<[f64; 2]>>,
}

impl GuideObserver for RecordingObserver {
    fn mark_candidate(&self, xy_ctr: [f64; 2], _xy_size: [f64; 2]) {
        self.candidates.lock().unwrap().push(xy_ctr);
    }

    fn mark_centroid(&self, xy_ctr: [f64; 2], _xy_err: [f64; 2]) {
        self.centroids.lock().unwrap().push(xy_ctr);
    }
}

#[test]
fn test_observer_sees_candidates_and_centroids() {
    let data = noisy_two_star_frame(3);
    let observer = RecordingObserver::default();
    let ctx = GuideContext::new().with_observer(&observer);
    let found =
        find_stars_with(ctx, &data.view(), None, None, &guide_ccd(), &quiet_config()).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(observer.candidates.lock().unwrap().len(), 2);
    assert_eq!(observer.centroids.lock().unwrap().len(), 2);
}

#[test]
fn test_basic_centroid_round_trip() {
    let true_xy = [27.0, 28.6];
    let data = fake_star([51, 51], true_xy, 2.0, 1000.0, CONV);
    let ccd = CcdInfo::new(0.0, 10.0, 1.0);
    let res = basic_centroid(
        &data.view(),
        None,
        None,
        &[26.0, 29.6],
        6.0,
        &ccd,
        &CentroidConfig::default(),
    )
    .unwrap();
    println!("{}", res);
    assert!(res.is_ok, "{}", res.msg);
    assert_eq!(res.rad, 6);
    assert!((res.xy_ctr[0] - true_xy[0]).abs() < 0.1, "{:?}", res.xy_ctr);
    assert!((res.xy_ctr[1] - true_xy[1]).abs() < 0.1, "{:?}", res.xy_ctr);
}

#[test]
fn test_centroid_ignores_distant_mask() {
    let true_xy = [27.0, 28.6];
    let mut data = fake_star([60, 56], true_xy, 2.0, 1000.0, CONV);
    data.mapv_inplace(|v| v + 100.0);
    let ccd = CcdInfo::new(0.0, 10.0, 1.0);
    let config = CentroidConfig::default();

    let plain = centroid(&data.view(), None, None, &[26.0, 29.6], 6.0, &ccd, &config).unwrap();
    assert!(plain.is_ok, "{}", plain.msg);

    let mut mask = Array2::from_elem(data.dim(), false);
    for i in 44..56 {
        for j in 0..12 {
            mask[[i, j]] = true;
        }
    }
    let masked =
        centroid(&data.view(), Some(&mask.view()), None, &[26.0, 29.6], 6.0, &ccd, &config).unwrap();
    assert!(masked.is_ok, "{}", masked.msg);
    for ii in 0..2 {
        let diff = (masked.xy_ctr[ii] - plain.xy_ctr[ii]).abs();
        assert!(
            diff <= plain.xy_err[ii] + 1e-9,
            "axis {ii}: moved {diff:.4} with error {:.4}",
            plain.xy_err[ii]
        );
        assert!((masked.xy_ctr[ii] - true_xy[ii]).abs() < 0.1);
    }
}

#[test]
fn test_centroid_iraf_convention() {
    let ccd = CcdInfo::new(0.0, 10.0, 1.0);
    let iraf = PositionConvention::Iraf;
    let mut data = fake_star([50, 50], [25.0, 30.0], 2.0, 1000.0, iraf);
    data.mapv_inplace(|v| v + 100.0);
    let config = CentroidConfig {
        convention: iraf,
        ..Default::default()
    };
    let res = centroid(&data.view(), None, None, &[24.0, 31.0], 6.0, &ccd, &config).unwrap();
    assert!(res.is_ok, "{}", res.msg);
    assert!((res.xy_ctr[0] - 25.0).abs() < 0.05, "{:?}", res.xy_ctr);
    assert!((res.xy_ctr[1] - 30.0).abs() < 0.05, "{:?}", res.xy_ctr);
}

#[test]
fn test_shape_of_found_stars() {
    let data = noisy_two_star_frame(5);
    let found = find_stars(&data.view(), None, None, &guide_ccd(), &quiet_config()).unwrap();
    let bright = &found.stars[0];
    let shape = star_shape(
        &data.view(),
        None,
        &bright.xy_ctr,
        bright.rad.max(6) as f64,
        &ShapeConfig::default(),
    )
    .unwrap();
    println!("{}", shape);
    assert!(shape.is_ok, "{}", shape.msg);
    let true_fwhm = 1.8 * FWHM_PER_SIGMA;
    assert!(
        (shape.fwhm - true_fwhm).abs() < 0.2 * true_fwhm,
        "fwhm={:.3}, expected={:.3}",
        shape.fwhm,
        true_fwhm
    );
    // Background is sky plus bias
    assert!((shape.bkgnd - 300.0).abs() < 30.0, "bkgnd={}", shape.bkgnd);
}
