//! Per-segment event accumulation.
//!
//! Key characteristics:
//! - One buffer per segment, opened by the segment's first pulse
//! - A buffer closes when a pulse arrives more than `time_window` ticks
//!   after the buffer's start time, or earlier than that start time
//! - Stripe channels are debiased by the electronics offset on entry
//! - End of stream force-closes every open buffer exactly once

use log::{debug, trace};
use segevent_core::{Axis, Error, FormationConfig, FormationStatistics, RawPulse, Result};

/// An in-progress event for one segment.
///
/// Returned by value when closed; the accumulator then holds a fresh buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentAccumulator {
    /// Summed wire amplitude.
    pub sum_amp_x: u64,
    /// Summed stripe amplitude.
    pub sum_amp_y: u64,
    /// Summed `channel * amplitude` over wires.
    pub sum_pos_amp_x: i64,
    /// Summed `channel * amplitude` over debiased stripes.
    pub sum_pos_amp_y: i64,
    /// Wire pulse count.
    pub count_x: u32,
    /// Stripe pulse count.
    pub count_y: u32,
    /// Lowest wire channel, valid when `count_x > 0`.
    pub min_x: i32,
    /// Highest wire channel, valid when `count_x > 0`.
    pub max_x: i32,
    /// Lowest stripe channel, valid when `count_y > 0`.
    pub min_y: i32,
    /// Highest stripe channel, valid when `count_y > 0`.
    pub max_y: i32,
    /// Timestamp of the pulse that opened the buffer.
    pub start_time: u64,
    /// Source row of the pulse that opened the buffer.
    pub source_index: u64,
    /// 1-based segment id.
    pub segment: u8,
    /// Ticks between the previous buffer's start and this one's.
    pub time_since_previous: u64,
    /// `(channel, amplitude)` of every wire pulse, in arrival order.
    pub series_x: Vec<(i32, u16)>,
    /// `(debiased channel, amplitude)` of every stripe pulse, in arrival order.
    pub series_y: Vec<(i32, u16)>,
}

impl SegmentAccumulator {
    /// Opens an empty buffer.
    #[must_use]
    pub fn open(segment: u8, start_time: u64, source_index: u64, time_since_previous: u64) -> Self {
        Self {
            sum_amp_x: 0,
            sum_amp_y: 0,
            sum_pos_amp_x: 0,
            sum_pos_amp_y: 0,
            count_x: 0,
            count_y: 0,
            min_x: i32::MAX,
            max_x: i32::MIN,
            min_y: i32::MAX,
            max_y: i32::MIN,
            start_time,
            source_index,
            segment,
            time_since_previous,
            series_x: Vec::with_capacity(8),
            series_y: Vec::with_capacity(8),
        }
    }

    /// Folds one pulse into the buffer. `channel` must already be debiased.
    pub fn add(&mut self, axis: Axis, channel: i32, amplitude: u16) {
        let weighted = i64::from(channel) * i64::from(amplitude);
        match axis {
            Axis::Wire => {
                self.sum_amp_x += u64::from(amplitude);
                self.sum_pos_amp_x += weighted;
                self.count_x += 1;
                self.min_x = self.min_x.min(channel);
                self.max_x = self.max_x.max(channel);
                self.series_x.push((channel, amplitude));
            }
            Axis::Stripe => {
                self.sum_amp_y += u64::from(amplitude);
                self.sum_pos_amp_y += weighted;
                self.count_y += 1;
                self.min_y = self.min_y.min(channel);
                self.max_y = self.max_y.max(channel);
                self.series_y.push((channel, amplitude));
            }
        }
    }

    /// Returns true if no pulse has been folded in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count_x == 0 && self.count_y == 0
    }

    /// Returns true if both axes saw at least one pulse.
    #[must_use]
    pub fn has_both_axes(&self) -> bool {
        self.count_x > 0 && self.count_y > 0
    }

    /// Number of pulses folded in.
    #[must_use]
    pub fn len(&self) -> usize {
        (self.count_x + self.count_y) as usize
    }

    /// Zero-based segment index.
    #[must_use]
    pub fn segment_index(&self) -> usize {
        usize::from(self.segment.saturating_sub(1))
    }

    /// Wire extent, 0 for an empty axis.
    #[must_use]
    pub fn width_x(&self) -> u32 {
        if self.count_x == 0 {
            0
        } else {
            self.max_x.abs_diff(self.min_x)
        }
    }

    /// Stripe extent, 0 for an empty axis.
    #[must_use]
    pub fn width_y(&self) -> u32 {
        if self.count_y == 0 {
            0
        } else {
            self.max_y.abs_diff(self.min_y)
        }
    }
}

/// Accumulator state: the per-segment buffers and running counters.
#[derive(Debug, Default)]
pub struct AccumulatorState {
    buffers: Vec<Option<SegmentAccumulator>>,
    statistics: FormationStatistics,
}

impl AccumulatorState {
    /// Drops every open buffer and zeroes the counters.
    pub fn reset(&mut self) {
        self.buffers.iter_mut().for_each(|slot| *slot = None);
        self.statistics = FormationStatistics::default();
    }

    /// Open buffer for a 1-based segment, if any.
    #[must_use]
    pub fn buffer(&self, segment: u8) -> Option<&SegmentAccumulator> {
        let index = usize::from(segment.checked_sub(1)?);
        self.buffers.get(index)?.as_ref()
    }

    /// Number of segments with an open buffer.
    #[must_use]
    pub fn open_buffers(&self) -> usize {
        self.buffers.iter().filter(|slot| slot.is_some()).count()
    }

    /// Counters so far.
    #[must_use]
    pub fn statistics(&self) -> &FormationStatistics {
        &self.statistics
    }
}

/// Sliding time-window event accumulator.
#[derive(Clone, Debug)]
pub struct EventAccumulator {
    config: FormationConfig,
}

impl EventAccumulator {
    /// Create with custom configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration does not validate.
    pub fn new(config: FormationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get current configuration.
    #[must_use]
    pub fn config(&self) -> &FormationConfig {
        &self.config
    }

    /// Allocates one empty slot per configured segment.
    #[must_use]
    pub fn create_state(&self) -> AccumulatorState {
        AccumulatorState {
            buffers: vec![None; self.config.segment_count],
            statistics: FormationStatistics::default(),
        }
    }

    /// Absorbs one pulse, returning the buffer it closed (if any and if admitted).
    ///
    /// Self-trigger pulses are counted and ignored.
    ///
    /// # Errors
    /// Returns [`Error::SegmentOutOfRange`] if the pulse's segment has no slot.
    pub fn absorb(
        &self,
        pulse: &RawPulse,
        state: &mut AccumulatorState,
    ) -> Result<Option<SegmentAccumulator>> {
        state.statistics.pulses_seen += 1;
        if !pulse.is_physical() {
            state.statistics.self_triggers += 1;
            return Ok(None);
        }

        let slot = self.slot(pulse.segment, state)?;
        let window = self.config.time_window;

        let entry = &mut state.buffers[slot];
        let closed = match entry {
            Some(buffer) if Self::leaves_window(pulse.timestamp, buffer.start_time, window) => {
                if pulse.timestamp < buffer.start_time {
                    state.statistics.out_of_order_pulses += 1;
                    debug!(
                        "segment {}: pulse at {} precedes buffer start {} (row {})",
                        pulse.segment, pulse.timestamp, buffer.start_time, pulse.source_index
                    );
                }
                let elapsed = pulse.timestamp.saturating_sub(buffer.start_time);
                let fresh = SegmentAccumulator::open(
                    pulse.segment,
                    pulse.timestamp,
                    pulse.source_index,
                    elapsed,
                );
                Some(std::mem::replace(buffer, fresh))
            }
            Some(_) => None,
            None => {
                *entry = Some(SegmentAccumulator::open(
                    pulse.segment,
                    pulse.timestamp,
                    pulse.source_index,
                    0,
                ));
                None
            }
        };

        if let Some(buffer) = state.buffers[slot].as_mut() {
            let channel = match pulse.axis {
                Axis::Wire => i32::from(pulse.channel),
                Axis::Stripe => i32::from(pulse.channel) - self.config.stripe_offset,
            };
            buffer.add(pulse.axis, channel, pulse.amplitude);
            state.statistics.pulses_absorbed += 1;
        }

        Ok(closed.and_then(|buffer| self.admit(buffer, &mut state.statistics)))
    }

    /// Force-closes every open buffer in segment order.
    ///
    /// Each buffer is returned at most once; a second call yields nothing.
    pub fn flush(&self, state: &mut AccumulatorState) -> Vec<SegmentAccumulator> {
        let mut closed = Vec::with_capacity(state.buffers.len());
        for slot in &mut state.buffers {
            if let Some(buffer) = slot.take() {
                if let Some(buffer) = self.admit(buffer, &mut state.statistics) {
                    closed.push(buffer);
                }
            }
        }
        closed
    }

    /// Unsigned window test: a pulse older than the buffer start also closes it.
    fn leaves_window(timestamp: u64, start_time: u64, window: u64) -> bool {
        timestamp.wrapping_sub(start_time) > window
    }

    fn slot(&self, segment: u8, state: &AccumulatorState) -> Result<usize> {
        let count = self.config.segment_count.min(state.buffers.len());
        match usize::from(segment) {
            s if s >= 1 && s <= count => Ok(s - 1),
            _ => Err(Error::SegmentOutOfRange {
                segment,
                segment_count: self.config.segment_count,
            }),
        }
    }

    /// Applies the emission policy to a closed buffer.
    fn admit(
        &self,
        buffer: SegmentAccumulator,
        statistics: &mut FormationStatistics,
    ) -> Option<SegmentAccumulator> {
        statistics.buffers_closed += 1;
        if self.config.require_both_axes && !buffer.has_both_axes() {
            statistics.events_dropped += 1;
            trace!(
                "segment {}: dropping buffer at {} (multx={}, multy={})",
                buffer.segment,
                buffer.start_time,
                buffer.count_x,
                buffer.count_y
            );
            return None;
        }
        trace!(
            "segment {}: closed buffer at {} with {} pulses",
            buffer.segment,
            buffer.start_time,
            buffer.len()
        );
        Some(buffer)
    }
}

impl Default for EventAccumulator {
    fn default() -> Self {
        Self {
            config: FormationConfig::default(),
        }
    }
}
