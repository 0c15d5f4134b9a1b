//! Pipeline configuration.
//!
//! Defaults describe the reference two-segment detector: 128 wires per
//! segment, stripes numbered from 512, 30-tick coincidence window.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for per-segment event formation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FormationConfig {
    /// A buffer closes when a pulse arrives more than this many ticks after its start.
    pub time_window: u64,
    /// Offset subtracted from stripe channel numbers.
    pub stripe_offset: i32,
    /// Number of segments (one accumulator each).
    pub segment_count: usize,
    /// Global x shift per segment index (channels).
    pub segment_pitch: f64,
    /// Emit a closed buffer only if both axes saw a pulse.
    pub require_both_axes: bool,
}

impl Default for FormationConfig {
    fn default() -> Self {
        Self {
            time_window: 30,
            stripe_offset: 512,
            segment_count: 2,
            segment_pitch: 128.0,
            require_both_axes: false,
        }
    }
}

impl FormationConfig {
    /// Creates a new formation configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the accumulation window.
    #[must_use]
    pub fn with_time_window(mut self, ticks: u64) -> Self {
        self.time_window = ticks;
        self
    }

    /// Sets the stripe channel offset.
    #[must_use]
    pub fn with_stripe_offset(mut self, offset: i32) -> Self {
        self.stripe_offset = offset;
        self
    }

    /// Sets the number of segments.
    #[must_use]
    pub fn with_segment_count(mut self, count: usize) -> Self {
        self.segment_count = count;
        self
    }

    /// Sets the per-segment x pitch.
    #[must_use]
    pub fn with_segment_pitch(mut self, pitch: f64) -> Self {
        self.segment_pitch = pitch;
        self
    }

    /// Sets the both-axes emission policy.
    #[must_use]
    pub fn with_require_both_axes(mut self, require: bool) -> Self {
        self.require_both_axes = require;
        self
    }

    /// Checks the configuration for values the accumulator cannot work with.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for a zero or oversized segment count,
    /// or a non-finite pitch.
    pub fn validate(&self) -> Result<()> {
        if self.segment_count == 0 || self.segment_count > usize::from(u8::MAX) {
            return Err(Error::InvalidConfig(format!(
                "segment_count must be in 1..=255, got {}",
                self.segment_count
            )));
        }
        if !self.segment_pitch.is_finite() {
            return Err(Error::InvalidConfig(
                "segment_pitch must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for Gaussian sub-channel refinement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RefinementConfig {
    /// Run the fit at all.
    pub enabled: bool,
    /// Levenberg-Marquardt iteration limit.
    pub max_iterations: usize,
    /// Relative parameter step below which the fit is converged.
    pub tolerance: f64,
    /// Starting width (channels) when the sample spread is degenerate.
    pub initial_sigma: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_iterations: 50,
            tolerance: 1e-6,
            initial_sigma: 1.0,
        }
    }
}

impl RefinementConfig {
    /// Creates a new refinement configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the fit.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the iteration limit.
    #[must_use]
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Sets the convergence tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Checks the fit parameters.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the iteration limit is zero or the
    /// tolerance/width are not positive.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.initial_sigma > 0.0 && self.initial_sigma.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "initial_sigma must be positive, got {}",
                self.initial_sigma
            )));
        }
        Ok(())
    }
}

/// Configuration for the cross-segment boundary pass.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CorrelationConfig {
    /// Global x coordinate of the segment boundary.
    pub boundary: f64,
    /// Half width of the boundary band in x.
    pub x_window: f64,
    /// Maximum y difference of a merged pair.
    pub y_window: f64,
    /// Pairs must lie strictly closer than this in time (ticks).
    pub time_window: u64,
    /// Drop events with an empty axis instead of passing them through.
    pub drop_incomplete: bool,
    /// Attach the pair time separation to merged events.
    pub record_boundary_dt: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            boundary: 127.5,
            x_window: 3.0,
            y_window: 3.0,
            time_window: 30,
            drop_incomplete: true,
            record_boundary_dt: false,
        }
    }
}

impl CorrelationConfig {
    /// Creates a new correlation configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the boundary coordinate.
    #[must_use]
    pub fn with_boundary(mut self, boundary: f64) -> Self {
        self.boundary = boundary;
        self
    }

    /// Sets the x band half width.
    #[must_use]
    pub fn with_x_window(mut self, window: f64) -> Self {
        self.x_window = window;
        self
    }

    /// Sets the y tolerance.
    #[must_use]
    pub fn with_y_window(mut self, window: f64) -> Self {
        self.y_window = window;
        self
    }

    /// Sets the pair time window.
    #[must_use]
    pub fn with_time_window(mut self, ticks: u64) -> Self {
        self.time_window = ticks;
        self
    }

    /// Sets whether empty-axis events are dropped.
    #[must_use]
    pub fn with_drop_incomplete(mut self, drop: bool) -> Self {
        self.drop_incomplete = drop;
        self
    }

    /// Sets whether merged events carry their pair separation.
    #[must_use]
    pub fn with_record_boundary_dt(mut self, record: bool) -> Self {
        self.record_boundary_dt = record;
        self
    }

    /// Checks the windows.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for non-finite coordinates or
    /// non-positive windows.
    pub fn validate(&self) -> Result<()> {
        if !self.boundary.is_finite() {
            return Err(Error::InvalidConfig("boundary must be finite".to_string()));
        }
        for (name, value) in [("x_window", self.x_window), ("y_window", self.y_window)] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.time_window == 0 {
            return Err(Error::InvalidConfig(
                "time_window must be at least 1 tick".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// Event formation stage.
    pub formation: FormationConfig,
    /// Sub-channel refinement stage.
    pub refinement: RefinementConfig,
    /// Boundary pass; `None` skips it.
    pub correlation: Option<CorrelationConfig>,
}

impl PipelineConfig {
    /// Creates a new pipeline configuration with default values (no correlation).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the formation stage.
    #[must_use]
    pub fn with_formation(mut self, formation: FormationConfig) -> Self {
        self.formation = formation;
        self
    }

    /// Sets the refinement stage.
    #[must_use]
    pub fn with_refinement(mut self, refinement: RefinementConfig) -> Self {
        self.refinement = refinement;
        self
    }

    /// Enables the boundary pass.
    #[must_use]
    pub fn with_correlation(mut self, correlation: CorrelationConfig) -> Self {
        self.correlation = Some(correlation);
        self
    }

    /// Validates every stage.
    ///
    /// # Errors
    /// Returns the first stage error found.
    pub fn validate(&self) -> Result<()> {
        self.formation.validate()?;
        self.refinement.validate()?;
        if let Some(correlation) = &self.correlation {
            correlation.validate()?;
        }
        Ok(())
    }
}
