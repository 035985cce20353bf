//! # starguide
//!
//! Star finding, centroiding and shape fitting for **telescope guide cameras**.
//!
//! Given a 2-D CCD frame, an optional mask of pixels to ignore and the
//! detector's calibration, `starguide` finds the stars, measures their
//! centers with sub-pixel precision and error estimates, and fits their
//! width (FWHM), amplitude and background.
//!
//! ## Features
//!
//! - **Robust detection**: background from trimmed quartiles; median filtering
//!   rejects hot pixels and cosmic rays before thresholding
//! - **Asymmetry centroiding**: walks to the pixel where the star is most
//!   radially symmetric, then refines with a parabola fit
//! - **Signal checks**: guesses and centroids with no real blob nearby are
//!   rejected rather than reported as stars
//! - **Shape fitting**: double-Gaussian radial profile fit with weighted least
//!   squares and Brent refinement of the FWHM
//! - **Failures are data**: a star that cannot be centroided or fit yields a
//!   result with `is_ok == false` and a message; only malformed input is an `Err`
//!
//! ## Example
//!
//! ```no_run
//! use ndarray::Array2;
//! use starguide::{centroid, find_stars, star_shape};
//! use starguide::{CcdInfo, CentroidConfig, FindStarsConfig, ShapeConfig};
//!
//! let data = Array2::<f32>::zeros((512, 512));
//! let ccd = CcdInfo::new(2176.0, 19.0, 2.1);
//!
//! // Find every star in the frame, brightest first
//! let found = find_stars(&data.view(), None, None, &ccd, &FindStarsConfig::default()).unwrap();
//! for star in &found.stars {
//!     let shape = star_shape(&data.view(), None, &star.xy_ctr, star.rad as f64, &ShapeConfig::default())
//!         .unwrap();
//!     println!("{star} {shape}");
//! }
//!
//! // Or centroid a single star near a known position
//! let res = centroid(&data.view(), None, None, &[100.0, 200.0], 8.0, &ccd, &CentroidConfig::default())
//!     .unwrap();
//! if res.is_ok {
//!     println!("x={:.2} +/- {:.2}", res.xy_ctr[0], res.xy_err[0]);
//! }
//! ```
//!
//! ## Coordinates
//!
//! Public positions are x,y with x along image columns. By default the
//! center of the first pixel is (0.5, 0.5); see [`PositionConvention`] for the
//! IRAF/DS9 convention.
//!
//! ## Logging
//!
//! Diagnostics go through [`tracing`], gated by each config's `verbosity`.

pub mod ccd;
pub mod centroid;
pub mod config;
pub mod error;
pub mod fake;
pub mod filter;
pub mod find_stars;
pub mod label;
pub mod minimize;
pub mod observer;
pub mod position;
pub mod radial;
pub mod shape;
pub mod signal;
pub mod stats;
pub mod subframe;

pub use ccd::CcdInfo;
pub use centroid::{basic_centroid, basic_centroid_with, centroid, centroid_with, CentroidResult};
pub use config::{CentroidConfig, FindStarsConfig, ShapeConfig};
pub use error::{GuideError, Result};
pub use find_stars::{find_stars, find_stars_from_raw, find_stars_with, FoundStars};
pub use observer::{GuideContext, GuideObserver, NullObserver};
pub use position::PositionConvention;
pub use radial::{RadialKernel, RadialProfile, RadialProfileProvider};
pub use shape::{star_shape, star_shape_with, ShapeResult};
pub use signal::{check_signal, SignalCheck};
pub use stats::{sky_stats, ImageStats};
pub use subframe::SubFrame;
