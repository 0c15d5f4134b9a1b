//! Position resolution for closed buffers.
//!
//! 1. Centroid: amplitude-weighted mean channel per axis
//! 2. Global x: wire centroid shifted by `segment_index * segment_pitch`
//! 3. Extent: max - min channel per axis
//! 4. Optional refinement: pluggable peak fit when an axis has 2+ pulses
#![allow(clippy::cast_precision_loss)]

use crate::accumulator::SegmentAccumulator;
use crate::gaussian::GaussianRefinement;
use log::debug;
use segevent_core::{
    AxisRefinement, FormationConfig, FormedEvent, RefinementConfig, Sample, NO_POSITION,
};

/// Fit attempts made while resolving one buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FitReport {
    /// Axes handed to the refinement.
    pub attempted: usize,
    /// Axes that fell back to the centroid.
    pub failed: usize,
}

/// Turns closed buffers into events.
pub struct PositionResolver {
    segment_pitch: f64,
    refinement: Option<Box<dyn AxisRefinement>>,
}

impl PositionResolver {
    /// Create a centroid-only resolver.
    #[must_use]
    pub fn new(segment_pitch: f64) -> Self {
        Self {
            segment_pitch,
            refinement: None,
        }
    }

    /// Create from stage configuration, attaching a Gaussian fit if enabled.
    #[must_use]
    pub fn from_config(formation: &FormationConfig, refinement: &RefinementConfig) -> Self {
        let resolver = Self::new(formation.segment_pitch);
        if refinement.enabled {
            resolver.with_refinement(Box::new(GaussianRefinement::new(refinement.clone())))
        } else {
            resolver
        }
    }

    /// Attach a sub-channel refinement.
    #[must_use]
    pub fn with_refinement(mut self, refinement: Box<dyn AxisRefinement>) -> Self {
        self.refinement = Some(refinement);
        self
    }

    /// Name of the attached refinement, if any.
    #[must_use]
    pub fn refinement_name(&self) -> Option<&'static str> {
        self.refinement.as_deref().map(AxisRefinement::name)
    }

    /// Resolve a closed buffer.
    #[must_use]
    pub fn resolve(&self, buffer: &SegmentAccumulator) -> FormedEvent {
        self.resolve_with_report(buffer).0
    }

    /// Resolve a closed buffer and report the fits it needed.
    #[must_use]
    pub fn resolve_with_report(&self, buffer: &SegmentAccumulator) -> (FormedEvent, FitReport) {
        let mut report = FitReport::default();
        let offset = buffer.segment_index() as f64 * self.segment_pitch;

        let (x, x_fit) = if buffer.count_x > 0 {
            let local = centroid(buffer.sum_pos_amp_x, buffer.sum_amp_x, &buffer.series_x);
            let fit = self
                .refine_axis(&buffer.series_x, local, &mut report)
                .unwrap_or(local);
            (local + offset, fit + offset)
        } else {
            (NO_POSITION, NO_POSITION)
        };

        let (y, y_fit) = if buffer.count_y > 0 {
            let local = centroid(buffer.sum_pos_amp_y, buffer.sum_amp_y, &buffer.series_y);
            let fit = self
                .refine_axis(&buffer.series_y, local, &mut report)
                .unwrap_or(local);
            (local, fit)
        } else {
            (NO_POSITION, NO_POSITION)
        };

        let event = FormedEvent {
            x,
            y,
            tot_x: buffer.sum_amp_x,
            tot_y: buffer.sum_amp_y,
            mult_x: buffer.count_x,
            mult_y: buffer.count_y,
            width_x: buffer.width_x(),
            width_y: buffer.width_y(),
            time: buffer.start_time,
            dtime: buffer.time_since_previous,
            source_index: buffer.source_index,
            segment: i32::from(buffer.segment.saturating_sub(1)),
            x_fit,
            y_fit,
            boundary_dt: None,
        };
        (event, report)
    }

    /// Runs the refinement on one axis; `None` means keep the centroid.
    fn refine_axis(
        &self,
        series: &[(i32, u16)],
        centroid: f64,
        report: &mut FitReport,
    ) -> Option<f64> {
        let refinement = self.refinement.as_deref()?;
        if series.len() < 2 {
            return None;
        }

        let mut samples: Vec<Sample> = series
            .iter()
            .map(|&(channel, amplitude)| Sample::new(f64::from(channel), f64::from(amplitude)))
            .collect();
        samples.sort_by(|a, b| a.position.total_cmp(&b.position));

        report.attempted += 1;
        match refinement.refine(&samples, centroid) {
            Ok(peak) => Some(peak),
            Err(err) => {
                report.failed += 1;
                debug!(
                    "{} fit of {} samples failed ({err}), keeping centroid {centroid:.3}",
                    refinement.name(),
                    samples.len()
                );
                None
            }
        }
    }
}

impl Default for PositionResolver {
    fn default() -> Self {
        Self::new(FormationConfig::default().segment_pitch)
    }
}

/// Amplitude-weighted mean channel; plain mean if every amplitude is zero.
fn centroid(sum_pos_amp: i64, sum_amp: u64, series: &[(i32, u16)]) -> f64 {
    if sum_amp > 0 {
        sum_pos_amp as f64 / sum_amp as f64
    } else {
        let n = series.len() as f64;
        series.iter().map(|&(c, _)| f64::from(c)).sum::<f64>() / n
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_abs_diff_eq;
    use segevent_core::{Axis, RefinementError};

    fn buffer(segment: u8, wires: &[(i32, u16)], stripes: &[(i32, u16)]) -> SegmentAccumulator {
        let mut buffer = SegmentAccumulator::open(segment, 1000, 42, 77);
        for &(c, a) in wires {
            buffer.add(Axis::Wire, c, a);
        }
        for &(c, a) in stripes {
            buffer.add(Axis::Stripe, c, a);
        }
        buffer
    }

    struct Failing;

    impl AxisRefinement for Failing {
        fn name(&self) -> &'static str {
            "Failing"
        }

        fn refine(&self, _: &[Sample], _: f64) -> Result<f64, RefinementError> {
            Err(RefinementError::NotConverged(1))
        }
    }

    /// Accepts only ascending samples and nudges the seed.
    struct Ordered;

    impl AxisRefinement for Ordered {
        fn name(&self) -> &'static str {
            "Ordered"
        }

        fn refine(&self, samples: &[Sample], initial: f64) -> Result<f64, RefinementError> {
            if samples.windows(2).any(|w| w[0].position > w[1].position) {
                return Err(RefinementError::Singular);
            }
            Ok(initial + 0.25)
        }
    }

    #[test]
    fn test_two_wire_centroid() {
        let event = PositionResolver::default().resolve(&buffer(1, &[(5, 10), (7, 10)], &[]));
        assert_eq!(event.x, 6.0);
        assert_eq!(event.width_x, 2);
        assert_eq!(event.tot_x, 20);
        assert_eq!(event.mult_x, 2);
        assert_eq!(event.y, NO_POSITION);
        assert_eq!(event.width_y, 0);
        assert_eq!(event.x_fit, event.x);
        assert_eq!(event.time, 1000);
        assert_eq!(event.dtime, 77);
        assert_eq!(event.source_index, 42);
        assert_eq!(event.segment, 0);
    }

    #[test]
    fn test_segment_offset_applies_to_x_only() {
        let event = PositionResolver::default().resolve(&buffer(2, &[(1, 3)], &[(20, 5)]));
        assert_eq!(event.x, 129.0);
        assert_eq!(event.y, 20.0);
        // Events carry the zero-based segment index.
        assert_eq!(event.segment, 1);
    }

    #[test]
    fn test_weighted_centroid_inside_extent() {
        let wires = [(3, 1), (4, 9), (8, 2)];
        let event = PositionResolver::default().resolve(&buffer(1, &wires, &[]));
        // (3 + 36 + 16) / 12
        assert_abs_diff_eq!(event.x, 55.0 / 12.0, epsilon = 1e-12);
        assert!(event.x >= 3.0 && event.x <= 8.0);
        assert_eq!(event.width_x, 5);
    }

    #[test]
    fn test_zero_amplitude_falls_back_to_mean() {
        let event = PositionResolver::default().resolve(&buffer(1, &[(4, 0), (6, 0)], &[]));
        assert_eq!(event.x, 5.0);
        assert!(!event.x.is_nan());
    }

    #[test]
    fn test_single_pulse_axis_is_not_fitted() {
        let resolver = PositionResolver::default().with_refinement(Box::new(Failing));
        let (event, report) =
            resolver.resolve_with_report(&buffer(1, &[(9, 4)], &[(30, 2), (32, 2)]));
        assert_eq!(event.x_fit, event.x);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.failed, 1);
        // Failed fit keeps the centroid.
        assert_eq!(event.y_fit, event.y);
    }

    #[test]
    fn test_refinement_sees_sorted_local_samples() {
        let resolver = PositionResolver::default().with_refinement(Box::new(Ordered));
        let (event, report) = resolver.resolve_with_report(&buffer(2, &[(7, 2), (5, 2)], &[]));

        assert_eq!(event.x, 134.0);
        assert_eq!(event.x_fit, 134.25);
        assert_eq!(report, FitReport { attempted: 1, failed: 0 });
        assert_eq!(resolver.refinement_name(), Some("Ordered"));
    }

    #[test]
    fn test_gaussian_from_config() {
        let resolver = PositionResolver::from_config(
            &FormationConfig::default(),
            &RefinementConfig::default().with_enabled(true),
        );
        assert_eq!(resolver.refinement_name(), Some("Gaussian"));

        let event = resolver.resolve(&buffer(1, &[(5, 10), (6, 30), (7, 10)], &[]));
        assert_abs_diff_eq!(event.x_fit, 6.0, epsilon = 1e-6);

        let plain = PositionResolver::from_config(
            &FormationConfig::default(),
            &RefinementConfig::default(),
        );
        assert!(plain.refinement_name().is_none());
    }
}
