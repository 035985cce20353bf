//! Pluggable collaborators: radial profile source and display hooks.

use ndarray::ArrayView2;

use crate::radial::{RadialKernel, RadialProfileProvider};

/// Receives intermediate results for display.
///
/// All methods default to doing nothing. Implementations must be `Sync`
/// because candidates are centroided in parallel.
pub trait GuideObserver: Sync {
    /// A frame is about to be searched.
    fn show_frame(&self, _data: &ArrayView2<f32>, _mask: Option<&ArrayView2<bool>>) {}

    /// A thresholded blob was accepted as a candidate star.
    fn mark_candidate(&self, _xy_ctr: [f64; 2], _xy_size: [f64; 2]) {}

    /// A centroid search is starting at `xy_guess` with radius `rad`.
    fn mark_search_circle(&self, _xy_guess: [f64; 2], _rad: f64) {}

    /// A centroid was found.
    fn mark_centroid(&self, _xy_ctr: [f64; 2], _xy_err: [f64; 2]) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl GuideObserver for NullObserver {}

/// Collaborators shared by the centroid, star finding and shape routines.
#[derive(Clone, Copy)]
pub struct GuideContext<'a> {
    pub profiles: &'a dyn RadialProfileProvider,
    pub observer: &'a dyn GuideObserver,
}

impl GuideContext<'static> {
    /// The built-in radial kernel and no observer.
    pub fn new() -> Self {
        Self {
            profiles: &RadialKernel,
            observer: &NullObserver,
        }
    }
}

impl Default for GuideContext<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GuideContext<'a> {
    pub fn with_observer<'b>(self, observer: &'b dyn GuideObserver) -> GuideContext<'b>
    where
        'a: 'b,
    {
        GuideContext {
            profiles: self.profiles,
            observer,
        }
    }

    pub fn with_profiles<'b>(self, profiles: &'b dyn RadialProfileProvider) -> GuideContext<'b>
    where
        'a: 'b,
    {
        GuideContext {
            profiles,
            observer: self.observer,
        }
    }
}

impl std::fmt::Debug for GuideContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuideContext").finish_non_exhaustive()
    }
}
