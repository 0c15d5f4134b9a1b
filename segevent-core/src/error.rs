//! Error types for segevent-core.

use thiserror::Error;

/// Result type alias for segevent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for segevent operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A pulse names a segment the pipeline has no accumulator for.
    #[error("segment {segment} outside configured range 1..={segment_count}")]
    SegmentOutOfRange { segment: u8, segment_count: usize },

    /// Configuration error.
    #[error("configuration error: {0}")]
    InvalidConfig(String),
}

/// Reasons a sub-channel refinement could not produce a peak position.
///
/// These never abort processing; the resolver falls back to the centroid.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum RefinementError {
    /// Fewer samples than free parameters of the model.
    #[error("need at least {required} samples, got {got}")]
    TooFewSamples { required: usize, got: usize },

    /// All sample weights are zero.
    #[error("sample weights sum to zero")]
    ZeroWeight,

    /// The normal equations could not be solved.
    #[error("singular normal matrix")]
    Singular,

    /// Iteration limit reached before the step fell below tolerance.
    #[error("no convergence after {0} iterations")]
    NotConverged(usize),

    /// A parameter became NaN or infinite.
    #[error("fit produced a non-finite parameter")]
    NonFinite,

    /// The fitted peak left the sampled channel range.
    #[error("fitted peak {peak} outside sampled range [{min}, {max}]")]
    PeakOutOfRange { peak: f64, min: f64, max: f64 },
}
