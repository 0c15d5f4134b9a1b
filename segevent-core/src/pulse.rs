//! Raw pulse types.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Readout axis of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    /// Anode wires, the x coordinate.
    Wire,
    /// Cathode stripes, the y coordinate.
    Stripe,
}

/// Origin of a pulse as flagged by the readout electronics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Classification {
    /// A genuine detector signal.
    #[default]
    Physical,
    /// A self-triggered (test or trigger) record.
    SelfTrigger,
}

/// A single channel firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawPulse {
    /// Axis the channel belongs to.
    pub axis: Axis,
    /// Channel number as delivered by the electronics (stripes still carry their offset).
    pub channel: u16,
    /// Time over threshold in clock ticks.
    pub amplitude: u16,
    /// Absolute timestamp in clock ticks.
    pub timestamp: u64,
    /// 1-based segment (module) id.
    pub segment: u8,
    /// Physical or self-trigger.
    pub classification: Classification,
    /// Row of the originating record in the raw input.
    pub source_index: u64,
}

impl RawPulse {
    /// Creates a physical wire pulse.
    #[must_use]
    pub fn wire(channel: u16, amplitude: u16, timestamp: u64, segment: u8) -> Self {
        Self {
            axis: Axis::Wire,
            channel,
            amplitude,
            timestamp,
            segment,
            classification: Classification::Physical,
            source_index: 0,
        }
    }

    /// Creates a physical stripe pulse. `channel` includes the electronics offset.
    #[must_use]
    pub fn stripe(channel: u16, amplitude: u16, timestamp: u64, segment: u8) -> Self {
        Self {
            axis: Axis::Stripe,
            ..Self::wire(channel, amplitude, timestamp, segment)
        }
    }

    /// Sets the source row.
    #[must_use]
    pub fn with_source_index(mut self, index: u64) -> Self {
        self.source_index = index;
        self
    }

    /// Sets the classification.
    #[must_use]
    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    /// Returns true if the pulse takes part in event formation.
    #[inline]
    #[must_use]
    pub fn is_physical(&self) -> bool {
        self.classification == Classification::Physical
    }
}
