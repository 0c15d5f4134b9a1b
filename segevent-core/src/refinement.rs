//! Sub-channel refinement trait.

use crate::error::RefinementError;

/// One point of an axis amplitude profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Channel position (axis-local).
    pub position: f64,
    /// Amplitude at that channel.
    pub weight: f64,
}

impl Sample {
    /// Creates a new sample.
    #[inline]
    #[must_use]
    pub fn new(position: f64, weight: f64) -> Self {
        Self { position, weight }
    }
}

/// Trait for peak-position estimators finer than the channel pitch.
///
/// Implementations receive the samples of one axis of one event sorted by
/// position, and the amplitude-weighted centroid as a starting point.
pub trait AxisRefinement: Send + Sync {
    /// Algorithm name.
    fn name(&self) -> &'static str;

    /// Returns the refined peak position.
    ///
    /// # Errors
    /// Returns a [`RefinementError`] when no trustworthy peak can be found;
    /// callers fall back to the centroid.
    fn refine(&self, samples: &[Sample], initial_peak: f64) -> Result<f64, RefinementError>;
}
