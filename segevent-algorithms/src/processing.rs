//! High-level drivers that chain accumulation, resolution and correlation.

use crate::accumulator::{AccumulatorState, EventAccumulator, SegmentAccumulator};
use crate::correlator::BoundaryCorrelator;
use crate::resolver::PositionResolver;
use log::info;
use segevent_core::{
    CorrelationConfig, CorrelationStatistics, FormationStatistics, FormedEvent, PipelineConfig,
    RawPulse, Result,
};

/// Streaming event former: accumulator, its state and a resolver.
pub struct EventFormer {
    accumulator: EventAccumulator,
    resolver: PositionResolver,
    state: AccumulatorState,
    emitted: usize,
    fits_attempted: usize,
    fits_failed: usize,
}

impl EventFormer {
    /// Build a former from the formation and refinement parts of `config`.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if the configuration does not validate.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.refinement.validate()?;
        let accumulator = EventAccumulator::new(config.formation.clone())?;
        let resolver = PositionResolver::from_config(&config.formation, &config.refinement);
        Ok(Self::with_parts(accumulator, resolver))
    }

    /// Build a former around an existing accumulator and resolver.
    #[must_use]
    pub fn with_parts(accumulator: EventAccumulator, resolver: PositionResolver) -> Self {
        let state = accumulator.create_state();
        Self {
            accumulator,
            resolver,
            state,
            emitted: 0,
            fits_attempted: 0,
            fits_failed: 0,
        }
    }

    /// Feed one pulse; returns the event it completed, if any.
    ///
    /// # Errors
    /// Returns `Error::SegmentOutOfRange` for pulses on unknown segments.
    pub fn push(&mut self, pulse: &RawPulse) -> Result<Option<FormedEvent>> {
        let closed = self.accumulator.absorb(pulse, &mut self.state)?;
        Ok(closed.map(|buffer| self.emit(&buffer)))
    }

    /// Close every open buffer and resolve it.
    pub fn finish(&mut self) -> Vec<FormedEvent> {
        let closed = self.accumulator.flush(&mut self.state);
        closed.iter().map(|buffer| self.emit(buffer)).collect()
    }

    /// Counters since construction (or the last [`reset`](Self::reset)).
    #[must_use]
    pub fn statistics(&self) -> FormationStatistics {
        FormationStatistics {
            events_emitted: self.emitted,
            fits_attempted: self.fits_attempted,
            fits_failed: self.fits_failed,
            ..*self.state.statistics()
        }
    }

    /// Discard open buffers and counters.
    pub fn reset(&mut self) {
        self.state.reset();
        self.emitted = 0;
        self.fits_attempted = 0;
        self.fits_failed = 0;
    }

    fn emit(&mut self, buffer: &SegmentAccumulator) -> FormedEvent {
        let (event, report) = self.resolver.resolve_with_report(buffer);
        self.emitted += 1;
        self.fits_attempted += report.attempted;
        self.fits_failed += report.failed;
        event
    }
}

/// Iterator adapter forming events from a pulse stream.
///
/// Yields events as their buffers close and the flushed remainder once the
/// input is exhausted. The first error ends the stream.
pub struct FormEventsStream<I> {
    pulses: I,
    former: EventFormer,
    pending: std::vec::IntoIter<FormedEvent>,
    done: bool,
}

impl<I> FormEventsStream<I> {
    /// Counters of the underlying former.
    #[must_use]
    pub fn statistics(&self) -> FormationStatistics {
        self.former.statistics()
    }
}

impl<I> Iterator for FormEventsStream<I>
where
    I: Iterator<Item = RawPulse>,
{
    type Item = Result<FormedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.pending.next() {
            return Some(Ok(event));
        }
        if self.done {
            return None;
        }
        for pulse in self.pulses.by_ref() {
            match self.former.push(&pulse) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        self.done = true;
        self.pending = self.former.finish().into_iter();
        self.pending.next().map(Ok)
    }
}

/// Form events lazily from any pulse iterator.
///
/// # Errors
/// Returns `Error::InvalidConfig` if the configuration does not validate.
pub fn form_events_iter<I>(
    pulses: I,
    config: &PipelineConfig,
) -> Result<FormEventsStream<I::IntoIter>>
where
    I: IntoIterator<Item = RawPulse>,
{
    Ok(FormEventsStream {
        pulses: pulses.into_iter(),
        former: EventFormer::new(config)?,
        pending: Vec::new().into_iter(),
        done: false,
    })
}

/// Form events from a slice of pulses in arrival order.
///
/// # Errors
/// Returns an error on invalid configuration or an out-of-range segment.
pub fn form_events(
    pulses: &[RawPulse],
    config: &PipelineConfig,
) -> Result<(Vec<FormedEvent>, FormationStatistics)> {
    let mut former = EventFormer::new(config)?;
    let mut events = Vec::new();
    for pulse in pulses {
        if let Some(event) = former.push(pulse)? {
            events.push(event);
        }
    }
    events.extend(former.finish());
    let stats = former.statistics();
    info!(
        "Formed {} events from {} pulses ({} self-triggers, {} dropped)",
        stats.events_emitted, stats.pulses_seen, stats.self_triggers, stats.events_dropped
    );
    Ok((events, stats))
}

/// Run the boundary pass over already formed events.
///
/// # Errors
/// Returns `Error::InvalidConfig` if the configuration does not validate.
pub fn correlate_events(
    events: &[FormedEvent],
    config: &CorrelationConfig,
) -> Result<(Vec<FormedEvent>, CorrelationStatistics)> {
    let correlator = BoundaryCorrelator::new(config.clone())?;
    Ok(correlator.correlate_with_statistics(events))
}

/// Result of a full pipeline run.
#[derive(Clone, Debug, Default)]
pub struct ProcessingOutput {
    /// Final events.
    pub events: Vec<FormedEvent>,
    /// Formation counters.
    pub formation: FormationStatistics,
    /// Boundary pass counters, if the pass ran.
    pub correlation: Option<CorrelationStatistics>,
}

/// Form events and, if configured, run the boundary pass.
///
/// # Errors
/// Returns an error on invalid configuration or an out-of-range segment.
pub fn process(pulses: &[RawPulse], config: &PipelineConfig) -> Result<ProcessingOutput> {
    config.validate()?;
    let (events, formation) = form_events(pulses, config)?;
    match &config.correlation {
        Some(correlation) => {
            let (events, stats) = correlate_events(&events, correlation)?;
            Ok(ProcessingOutput {
                events,
                formation,
                correlation: Some(stats),
            })
        }
        None => Ok(ProcessingOutput {
            events,
            formation,
            correlation: None,
        }),
    }
}
