//! segevent-core: Core types and traits for segmented detector event building.
//!
//! This crate provides the data model shared by every stage of the pipeline
//! (raw pulses, formed events), the configuration structs, the error types and
//! the pluggable sub-channel refinement trait.
//!

pub mod config;
pub mod error;
pub mod event;
pub mod pulse;
pub mod refinement;
pub mod statistics;

pub use config::{CorrelationConfig, FormationConfig, PipelineConfig, RefinementConfig};
pub use error::{Error, RefinementError, Result};
pub use event::{FormedEvent, MERGED_SEGMENT, NO_POSITION};
pub use pulse::{Axis, Classification, RawPulse};
pub use refinement::{AxisRefinement, Sample};
pub use statistics::{CorrelationStatistics, FormationStatistics};
