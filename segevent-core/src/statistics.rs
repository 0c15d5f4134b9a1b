//! Counters reported by the pipeline stages.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Counters for event formation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FormationStatistics {
    /// Pulses handed to the accumulator.
    pub pulses_seen: usize,
    /// Self-trigger pulses discarded.
    pub self_triggers: usize,
    /// Physical pulses folded into a buffer.
    pub pulses_absorbed: usize,
    /// Pulses older than the start of their segment's open buffer.
    pub out_of_order_pulses: usize,
    /// Buffers closed (by the window or the final flush).
    pub buffers_closed: usize,
    /// Closed buffers turned into events.
    pub events_emitted: usize,
    /// Closed buffers rejected by the both-axes policy.
    pub events_dropped: usize,
    /// Axis fits started.
    pub fits_attempted: usize,
    /// Axis fits that fell back to the centroid.
    pub fits_failed: usize,
}

impl FormationStatistics {
    /// Adds another set of counters to this one.
    pub fn merge(&mut self, other: &Self) {
        self.pulses_seen += other.pulses_seen;
        self.self_triggers += other.self_triggers;
        self.pulses_absorbed += other.pulses_absorbed;
        self.out_of_order_pulses += other.out_of_order_pulses;
        self.buffers_closed += other.buffers_closed;
        self.events_emitted += other.events_emitted;
        self.events_dropped += other.events_dropped;
        self.fits_attempted += other.fits_attempted;
        self.fits_failed += other.fits_failed;
    }
}

/// Counters for the boundary pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorrelationStatistics {
    /// Events read.
    pub events_in: usize,
    /// Events written.
    pub events_out: usize,
    /// Events inside the boundary band that started a partner search.
    pub boundary_candidates: usize,
    /// Pairs merged.
    pub merges: usize,
    /// Events removed because an axis was empty.
    pub dropped_incomplete: usize,
}
