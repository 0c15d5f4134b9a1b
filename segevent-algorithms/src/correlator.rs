//! Cross-segment boundary correlation.
//!
//! A particle landing on the seam between two segments deposits charge on
//! both sides and is formed into two events, one per segment. This pass
//! finds such pairs in the time-ordered event sequence and merges them into
//! a single event tagged with [`MERGED_SEGMENT`].
#![allow(clippy::cast_precision_loss)]

use log::{debug, info, trace};
use segevent_core::{
    CorrelationConfig, CorrelationStatistics, FormedEvent, Result, MERGED_SEGMENT,
};
use std::collections::HashSet;

/// Merges events split across the segment boundary.
#[derive(Clone, Debug, Default)]
pub struct BoundaryCorrelator {
    config: CorrelationConfig,
}

impl BoundaryCorrelator {
    /// Create with custom configuration.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if the configuration is invalid.
    pub fn new(config: CorrelationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get current configuration.
    #[must_use]
    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Run the boundary pass over a time-ordered event sequence.
    #[must_use]
    pub fn correlate(&self, events: &[FormedEvent]) -> Vec<FormedEvent> {
        self.correlate_with_statistics(events).0
    }

    /// Run the boundary pass and report what it did.
    #[must_use]
    pub fn correlate_with_statistics(
        &self,
        events: &[FormedEvent],
    ) -> (Vec<FormedEvent>, CorrelationStatistics) {
        let mut stats = CorrelationStatistics {
            events_in: events.len(),
            ..Default::default()
        };
        let mut consumed: HashSet<usize> = HashSet::new();
        let mut output = Vec::with_capacity(events.len());

        for (i, event) in events.iter().enumerate() {
            if consumed.contains(&i) {
                continue;
            }
            if !event.has_both_axes() {
                if self.config.drop_incomplete {
                    stats.dropped_incomplete += 1;
                    continue;
                }
                output.push(*event);
                continue;
            }
            if event.is_merged() || !self.near_boundary(event) {
                output.push(*event);
                continue;
            }

            stats.boundary_candidates += 1;
            match self.find_partner(events, i, &consumed) {
                Some(j) => {
                    consumed.insert(j);
                    stats.merges += 1;
                    let merged = merge_pair(event, &events[j], self.config.record_boundary_dt);
                    debug!(
                        "merged events {i} (segment {}) and {j} (segment {}) at x={:.2}",
                        event.segment, events[j].segment, merged.x
                    );
                    output.push(merged);
                }
                None => {
                    trace!("boundary event {i} has no partner");
                    output.push(*event);
                }
            }
        }

        stats.events_out = output.len();
        info!(
            "Correlated {} events: {} merges, {} dropped incomplete, {} out",
            stats.events_in, stats.merges, stats.dropped_incomplete, stats.events_out
        );
        (output, stats)
    }

    fn near_boundary(&self, event: &FormedEvent) -> bool {
        (event.x - self.config.boundary).abs() < self.config.x_window
    }

    /// Partner band test; unlike [`near_boundary`](Self::near_boundary) the edge is inside.
    fn partner_in_band(&self, event: &FormedEvent) -> bool {
        (event.x - self.config.boundary).abs() <= self.config.x_window
    }

    /// Index of the first event after `i` that pairs with `events[i]`.
    fn find_partner(
        &self,
        events: &[FormedEvent],
        i: usize,
        consumed: &HashSet<usize>,
    ) -> Option<usize> {
        let event = &events[i];
        for (j, other) in events.iter().enumerate().skip(i + 1) {
            if consumed.contains(&j)
                || other.is_merged()
                || !self.partner_in_band(other)
                || !other.has_both_axes()
                || other.segment == event.segment
            {
                continue;
            }
            if other.time.abs_diff(event.time) >= self.config.time_window {
                if other.time >= event.time {
                    return None;
                }
                continue;
            }
            if (other.y - event.y).abs() > self.config.y_window {
                continue;
            }
            return Some(j);
        }
        None
    }
}

/// Combine two halves of a boundary event.
///
/// Amplitudes and wire multiplicities add, positions are amplitude-weighted,
/// the stripe multiplicity and gap take the larger side. Timing, widths and
/// the source row come from `first`.
#[must_use]
pub fn merge_pair(first: &FormedEvent, second: &FormedEvent, record_dt: bool) -> FormedEvent {
    let tot_x = first.tot_x + second.tot_x;
    let tot_y = first.tot_y + second.tot_y;
    FormedEvent {
        x: weighted(first.x, first.tot_x, second.x, second.tot_x),
        y: weighted(first.y, first.tot_y, second.y, second.tot_y),
        tot_x,
        tot_y,
        mult_x: first.mult_x + second.mult_x,
        mult_y: first.mult_y.max(second.mult_y),
        width_x: first.width_x,
        width_y: first.width_y,
        time: first.time,
        dtime: first.dtime.max(second.dtime),
        source_index: first.source_index,
        segment: MERGED_SEGMENT,
        x_fit: weighted(first.x_fit, first.tot_x, second.x_fit, second.tot_x),
        y_fit: weighted(first.y_fit, first.tot_y, second.y_fit, second.tot_y),
        boundary_dt: record_dt.then(|| first.time.abs_diff(second.time)),
    }
}

fn weighted(a: f64, wa: u64, b: f64, wb: u64) -> f64 {
    let total = wa + wb;
    if total == 0 {
        return (a + b) / 2.0;
    }
    (a * wa as f64 + b * wb as f64) / total as f64
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_abs_diff_eq;

    fn event(x: f64, y: f64, tot: u64, time: u64, segment: i32) -> FormedEvent {
        FormedEvent {
            x,
            y,
            tot_x: tot,
            tot_y: tot,
            mult_x: 2,
            mult_y: 1,
            width_x: 1,
            width_y: 0,
            time,
            dtime: 100,
            source_index: time,
            segment,
            x_fit: x,
            y_fit: y,
            boundary_dt: None,
        }
    }

    fn correlator() -> BoundaryCorrelator {
        BoundaryCorrelator::default()
    }

    #[test]
    fn test_boundary_pair_merges() {
        let events = vec![event(126.0, 40.0, 50, 1000, 1), event(129.0, 41.0, 50, 1003, 2)];
        let (out, stats) = correlator().correlate_with_statistics(&events);

        assert_eq!(out.len(), 1);
        let merged = &out[0];
        assert_eq!(merged.x, 127.5);
        assert_eq!(merged.y, 40.5);
        assert_eq!(merged.tot_x, 100);
        assert_eq!(merged.mult_x, 4);
        assert_eq!(merged.mult_y, 1);
        assert_eq!(merged.segment, MERGED_SEGMENT);
        assert_eq!(merged.time, 1000);
        assert!(merged.boundary_dt.is_none());
        assert_eq!(stats.merges, 1);
        assert_eq!(stats.boundary_candidates, 1);
        assert_eq!(stats.events_out, 1);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = FormedEvent {
            mult_y: 3,
            dtime: 7,
            ..event(125.2, 10.0, 30, 500, 1)
        };
        let b = event(128.9, 11.5, 90, 502, 2);
        let ab = merge_pair(&a, &b, false);
        let ba = merge_pair(&b, &a, false);

        assert_abs_diff_eq!(ab.x, ba.x, epsilon = 1e-12);
        assert_abs_diff_eq!(ab.y, ba.y, epsilon = 1e-12);
        assert_eq!(ab.tot_x, ba.tot_x);
        assert_eq!(ab.tot_y, ba.tot_y);
        assert_eq!(ab.mult_x, ba.mult_x);
        assert_eq!(ab.mult_y, 3);
        assert_eq!(ba.mult_y, 3);
        assert_eq!(ab.dtime, 100);
    }

    #[test]
    fn test_merge_zero_tot_uses_midpoint() {
        let a = event(126.0, 10.0, 0, 0, 1);
        let b = event(129.0, 12.0, 0, 1, 2);
        let merged = merge_pair(&a, &b, true);
        assert_eq!(merged.x, 127.5);
        assert_eq!(merged.y, 11.0);
        assert_eq!(merged.boundary_dt, Some(1));
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let events = vec![
            event(126.0, 40.0, 50, 1000, 1),
            event(129.0, 41.0, 50, 1003, 2),
            event(128.0, 40.0, 20, 1010, 2),
            event(60.0, 5.0, 20, 1020, 1),
        ];
        let once = correlator().correlate(&events);
        let (twice, stats) = correlator().correlate_with_statistics(&once);
        assert_eq!(once, twice);
        assert_eq!(stats.merges, 0);
    }

    #[test]
    fn test_far_from_boundary_passes_through() {
        let events = vec![event(124.5, 40.0, 50, 1000, 1), event(129.0, 40.0, 50, 1001, 2)];
        let out = correlator().correlate(&events);
        assert_eq!(out, events);
    }

    #[test]
    fn test_partner_on_band_edge_is_accepted() {
        // 130.5 sits exactly x_window from the boundary.
        let events = vec![event(126.0, 40.0, 50, 1000, 1), event(130.5, 40.0, 50, 1002, 2)];
        let out = correlator().correlate(&events);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_merged());
        assert_eq!(out[0].x, 128.25);

        // The same event cannot open a pair itself.
        let reversed = vec![event(130.5, 40.0, 50, 1000, 2), event(126.0, 40.0, 50, 1002, 1)];
        let out = correlator().correlate(&reversed);
        assert_eq!(out, reversed);
    }

    #[test]
    fn test_time_window_stops_scan() {
        let events = vec![event(126.0, 40.0, 50, 1000, 1), event(129.0, 40.0, 50, 1030, 2)];
        let out = correlator().correlate(&events);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| !e.is_merged()));
    }

    #[test]
    fn test_stale_event_does_not_stop_scan() {
        let events = vec![
            event(126.0, 40.0, 50, 1000, 1),
            event(129.0, 40.0, 50, 900, 2),
            event(128.0, 40.0, 50, 1005, 2),
        ];
        let out = correlator().correlate(&events);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].segment, MERGED_SEGMENT);
        assert_eq!(out[0].x, 127.0);
        assert_eq!(out[1].time, 900);
    }

    #[test]
    fn test_y_mismatch_and_same_segment_are_skipped() {
        let events = vec![
            event(126.0, 40.0, 50, 1000, 1),
            event(129.0, 44.0, 50, 1001, 2),
            event(127.0, 40.0, 50, 1002, 1),
            event(128.0, 42.5, 50, 1003, 2),
        ];
        let out = correlator().correlate(&events);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].segment, MERGED_SEGMENT);
        assert_eq!(out[0].x, 127.0);
        assert_eq!(out[1].y, 44.0);
        // Event 2 finds nothing: its only later partner was consumed.
        assert_eq!(out[2].x, 127.0);
        assert_eq!(out[2].segment, 1);
    }

    #[test]
    fn test_first_candidate_wins() {
        let events = vec![
            event(126.0, 40.0, 50, 1000, 1),
            event(129.0, 40.0, 50, 1001, 2),
            event(128.0, 40.0, 50, 1002, 2),
        ];
        let out = correlator().correlate(&events);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].x, 127.5);
        assert_eq!(out[1].time, 1002);
    }

    #[test]
    fn test_incomplete_events() {
        let mut empty_y = event(126.0, 40.0, 50, 1000, 1);
        empty_y.mult_y = 0;
        let events = vec![empty_y, event(129.0, 40.0, 50, 1001, 2)];

        let (out, stats) = correlator().correlate_with_statistics(&events);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].segment, 2);
        assert_eq!(stats.dropped_incomplete, 1);

        let keep = BoundaryCorrelator::new(CorrelationConfig::default().with_drop_incomplete(false))
            .unwrap();
        let out = keep.correlate(&events);
        assert_eq!(out, events);
    }

    #[test]
    fn test_boundary_dt_recorded() {
        let config = CorrelationConfig::default().with_record_boundary_dt(true);
        let events = vec![event(126.0, 40.0, 50, 1000, 1), event(129.0, 40.0, 50, 1003, 2)];
        let out = BoundaryCorrelator::new(config).unwrap().correlate(&events);
        assert_eq!(out[0].boundary_dt, Some(3));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CorrelationConfig::default().with_x_window(0.0);
        assert!(BoundaryCorrelator::new(config).is_err());
    }
}
