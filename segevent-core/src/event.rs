//! Formed event type.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Position written for an axis that saw no pulses.
pub const NO_POSITION: f64 = -10.0;

/// Segment id carried by events reconstructed across a segment boundary.
pub const MERGED_SEGMENT: i32 = -1;

/// One reconstructed detector event.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FormedEvent {
    /// Wire centroid on the global axis, or [`NO_POSITION`].
    pub x: f64,
    /// Stripe centroid, or [`NO_POSITION`].
    pub y: f64,
    /// Summed wire time over threshold.
    pub tot_x: u64,
    /// Summed stripe time over threshold.
    pub tot_y: u64,
    /// Number of wire pulses.
    pub mult_x: u32,
    /// Number of stripe pulses.
    pub mult_y: u32,
    /// Wire channel extent (max - min).
    pub width_x: u32,
    /// Stripe channel extent (max - min).
    pub width_y: u32,
    /// Start time of the accumulation buffer.
    pub time: u64,
    /// Ticks since the previous buffer of the same segment opened.
    pub dtime: u64,
    /// Raw row of the first pulse.
    pub source_index: u64,
    /// Zero-based segment index (readout id minus one), or [`MERGED_SEGMENT`].
    pub segment: i32,
    /// Refined wire position (equals `x` when no fit was made).
    pub x_fit: f64,
    /// Refined stripe position (equals `y` when no fit was made).
    pub y_fit: f64,
    /// Time separation of the pair joined by a boundary merge.
    pub boundary_dt: Option<u64>,
}

impl Default for FormedEvent {
    fn default() -> Self {
        Self {
            x: NO_POSITION,
            y: NO_POSITION,
            tot_x: 0,
            tot_y: 0,
            mult_x: 0,
            mult_y: 0,
            width_x: 0,
            width_y: 0,
            time: 0,
            dtime: 0,
            source_index: 0,
            segment: 0,
            x_fit: NO_POSITION,
            y_fit: NO_POSITION,
            boundary_dt: None,
        }
    }
}

impl FormedEvent {
    /// Returns true if both axes registered at least one pulse.
    #[inline]
    #[must_use]
    pub fn has_both_axes(&self) -> bool {
        self.mult_x > 0 && self.mult_y > 0
    }

    /// Returns true if this event is the product of a boundary merge.
    #[inline]
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.segment == MERGED_SEGMENT
    }

    /// Total number of pulses on both axes.
    #[inline]
    #[must_use]
    pub fn multiplicity(&self) -> u32 {
        self.mult_x + self.mult_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        let event = FormedEvent::default();
        assert!(!event.has_both_axes());
        assert!(!event.is_merged());
        assert!((event.x - NO_POSITION).abs() < f64::EPSILON);
        assert!(event.boundary_dt.is_none());
    }

    #[test]
    fn test_merged_flag() {
        let event = FormedEvent {
            segment: MERGED_SEGMENT,
            mult_x: 2,
            mult_y: 1,
            ..FormedEvent::default()
        };
        assert!(event.is_merged());
        assert!(event.has_both_axes());
        assert_eq!(event.multiplicity(), 3);
    }
}
