//! segevent-algorithms: Event building for segmented wire/stripe detectors.
//!
//! This crate provides the pipeline stages:
//! - **Accumulator** - per-segment sliding time-window buffers
//! - **Resolver** - weighted centroids, extents and global x offset
//! - **Gaussian** - optional Levenberg-Marquardt sub-channel refinement
//! - **Correlator** - merges events split across the segment boundary
//!
#![warn(missing_docs)]

mod accumulator;
mod correlator;
mod gaussian;
mod processing;
mod resolver;

pub use accumulator::{AccumulatorState, EventAccumulator, SegmentAccumulator};
pub use correlator::{merge_pair, BoundaryCorrelator};
pub use gaussian::GaussianRefinement;
pub use processing::{
    correlate_events, form_events, form_events_iter, process, EventFormer, FormEventsStream,
    ProcessingOutput,
};
pub use resolver::{FitReport, PositionResolver};

// Re-export the core types every caller of this crate needs
pub use segevent_core::{
    AxisRefinement, CorrelationConfig, CorrelationStatistics, FormationConfig,
    FormationStatistics, FormedEvent, PipelineConfig, RefinementConfig, Sample,
};
