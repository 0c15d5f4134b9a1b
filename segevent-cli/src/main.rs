//! segevent CLI
//!
//! Command-line front end for forming and correlating detector events.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{ArgAction, Args, Parser, Subcommand};
use segevent_algorithms::{
    correlate_events, form_events, process, CorrelationConfig, CorrelationStatistics,
    FormationStatistics, FormedEvent, PipelineConfig,
};
use segevent_core::{Classification, RawPulse};
use segevent_io::{
    read_events_binary, read_events_csv, read_pulse_records_csv, read_pulses_binary,
    read_pulses_csv, EventFields, EventFileWriter, MappedPulseReader, PulseRecord,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    SegeventIo(#[from] segevent_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] segevent_core::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// On-disk format, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Csv,
    Binary,
    #[cfg(feature = "hdf5")]
    Hdf5,
}

impl Format {
    fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "bin" | "dat" => Ok(Self::Binary),
            #[cfg(feature = "hdf5")]
            "h5" | "hdf5" => Ok(Self::Hdf5),
            _ => Err(CliError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Event building for segmented wire/stripe detectors.
#[derive(Parser)]
#[command(name = "segevent")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON pipeline configuration; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct FormationArgs {
    /// Refine positions with a Gaussian fit
    #[arg(long)]
    fit: bool,

    /// Drop events missing a wire or stripe hit
    #[arg(long)]
    require_both_axes: bool,

    /// Accumulation window in timestamp ticks
    #[arg(long)]
    time_window: Option<u64>,

    /// Number of detector segments
    #[arg(long)]
    segments: Option<usize>,
}

impl FormationArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(ticks) = self.time_window {
            config.formation.time_window = ticks;
        }
        if let Some(count) = self.segments {
            config.formation.segment_count = count;
        }
        if self.require_both_axes {
            config.formation.require_both_axes = true;
        }
        if self.fit {
            config.refinement.enabled = true;
        }
    }
}

#[derive(Args, Debug, Default)]
struct CorrelationArgs {
    /// Global x coordinate of the segment boundary
    #[arg(long)]
    boundary: Option<f64>,

    /// Maximum distance of a candidate from the boundary
    #[arg(long)]
    x_window: Option<f64>,

    /// Maximum y difference of a merged pair
    #[arg(long)]
    y_window: Option<f64>,

    /// Maximum time difference of a merged pair in ticks
    #[arg(long)]
    pair_window: Option<u64>,

    /// Keep events without both axes instead of dropping them
    #[arg(long)]
    keep_incomplete: bool,

    /// Write the pair time difference as a `boundtime` column
    #[arg(long)]
    boundary_dt: bool,
}

impl CorrelationArgs {
    fn resolve(&self, base: Option<CorrelationConfig>) -> CorrelationConfig {
        let mut config = base.unwrap_or_default();
        if let Some(boundary) = self.boundary {
            config.boundary = boundary;
        }
        if let Some(window) = self.x_window {
            config.x_window = window;
        }
        if let Some(window) = self.y_window {
            config.y_window = window;
        }
        if let Some(ticks) = self.pair_window {
            config.time_window = ticks;
        }
        if self.keep_incomplete {
            config.drop_incomplete = false;
        }
        if self.boundary_dt {
            config.record_boundary_dt = true;
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Form events from raw pulses
    Sort {
        /// Input pulse file
        input: PathBuf,

        /// Output event file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        formation: FormationArgs,
    },

    /// Merge events split across a segment boundary
    Correlate {
        /// Input event file
        input: PathBuf,

        /// Output event file
        #[arg(short, long)]
        output: PathBuf,

        /// Binary input carries `xfit`/`yfit` columns
        #[arg(long)]
        input_fit: bool,

        /// Binary input carries a `boundtime` column
        #[arg(long)]
        input_boundary_dt: bool,

        #[command(flatten)]
        correlation: CorrelationArgs,
    },

    /// Form events and run the boundary pass in one go
    Process {
        /// Input pulse file
        input: PathBuf,

        /// Output event file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        formation: FormationArgs,

        #[command(flatten)]
        correlation: CorrelationArgs,
    },

    /// Show information about a pulse file
    Info {
        /// Input pulse file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Sort {
            input,
            output,
            formation,
        } => {
            formation.apply(&mut config);
            config.validate()?;
            let out_format = Format::from_path(&output)?;

            let start = Instant::now();
            let pulses = read_pulses(&input)?;
            let (events, stats) = form_events(&pulses, &config)?;
            let fields = EventFields {
                fit: config.refinement.enabled,
                boundary_dt: false,
            };
            write_events(&output, out_format, &events, fields)?;

            println!(
                "Sorted {} in {:.2}s",
                input.display(),
                start.elapsed().as_secs_f64()
            );
            print_formation(&stats);
        }

        Commands::Correlate {
            input,
            output,
            input_fit,
            input_boundary_dt,
            correlation,
        } => {
            let correlation = correlation.resolve(config.correlation.take());
            correlation.validate()?;
            let out_format = Format::from_path(&output)?;

            let start = Instant::now();
            let input_fields = EventFields {
                fit: input_fit,
                boundary_dt: input_boundary_dt,
            };
            let events = read_events(&input, input_fields)?;
            let (merged, stats) = correlate_events(&events, &correlation)?;
            let covering = EventFields::covering(&merged);
            let fields = EventFields {
                fit: input_fit || covering.fit,
                boundary_dt: correlation.record_boundary_dt || covering.boundary_dt,
            };
            write_events(&output, out_format, &merged, fields)?;

            println!(
                "Correlated {} in {:.2}s",
                input.display(),
                start.elapsed().as_secs_f64()
            );
            print_correlation(&stats);
        }

        Commands::Process {
            input,
            output,
            formation,
            correlation,
        } => {
            formation.apply(&mut config);
            let correlation = correlation.resolve(config.correlation.take());
            let fields = EventFields {
                fit: config.refinement.enabled,
                boundary_dt: correlation.record_boundary_dt,
            };
            config.correlation = Some(correlation);
            config.validate()?;
            let out_format = Format::from_path(&output)?;

            let start = Instant::now();
            let pulses = read_pulses(&input)?;
            let result = process(&pulses, &config)?;
            write_events(&output, out_format, &result.events, fields)?;

            println!(
                "Processed {} in {:.2}s",
                input.display(),
                start.elapsed().as_secs_f64()
            );
            print_formation(&result.formation);
            if let Some(stats) = &result.correlation {
                print_correlation(stats);
            }
        }

        Commands::Info { input } => {
            let records = read_pulse_records(&input)?;
            let pulses: Vec<RawPulse> = records
                .iter()
                .zip(0u64..)
                .map(|(record, row)| record.to_pulse(row))
                .collect();

            println!("File: {}", input.display());
            println!("Pulses: {}", pulses.len());

            let self_triggers = pulses
                .iter()
                .filter(|p| p.classification == Classification::SelfTrigger)
                .count();
            println!("Self-triggers: {}", self_triggers);

            let min_time = pulses.iter().map(|p| p.timestamp).min();
            let max_time = pulses.iter().map(|p| p.timestamp).max();
            if let (Some(min_time), Some(max_time)) = (min_time, max_time) {
                println!(
                    "Time range: {} - {} ({} ticks)",
                    min_time,
                    max_time,
                    max_time - min_time
                );
            }

            let out_of_order = pulses
                .windows(2)
                .filter(|pair| pair[1].timestamp < pair[0].timestamp)
                .count();
            println!("Out-of-order pulses: {}", out_of_order);

            let mut per_segment: BTreeMap<u8, SegmentCounts> = BTreeMap::new();
            for pulse in &pulses {
                per_segment.entry(pulse.segment).or_default().add(pulse);
            }
            for (segment, counts) in &per_segment {
                println!(
                    "Segment {}: {} wire, {} stripe, {} self-trigger",
                    segment, counts.wire, counts.stripe, counts.self_trigger
                );
            }
        }
    }

    Ok(())
}

#[derive(Debug, Default)]
struct SegmentCounts {
    wire: usize,
    stripe: usize,
    self_trigger: usize,
}

impl SegmentCounts {
    fn add(&mut self, pulse: &RawPulse) {
        if !pulse.is_physical() {
            self.self_trigger += 1;
        } else if pulse.axis == segevent_core::Axis::Wire {
            self.wire += 1;
        } else {
            self.stripe += 1;
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let reader = BufReader::new(File::open(path)?);
    let config: PipelineConfig = serde_json::from_reader(reader)?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn read_pulses(path: &Path) -> Result<Vec<RawPulse>> {
    let pulses = match Format::from_path(path)? {
        Format::Csv => read_pulses_csv(path)?,
        Format::Binary => read_pulses_binary(path)?,
        #[cfg(feature = "hdf5")]
        Format::Hdf5 => segevent_io::read_pulses_hdf5(path)?,
    };
    log::info!("Read {} pulses from {}", pulses.len(), path.display());
    Ok(pulses)
}

fn read_pulse_records(path: &Path) -> Result<Vec<PulseRecord>> {
    let records = match Format::from_path(path)? {
        Format::Csv => read_pulse_records_csv(path)?,
        Format::Binary => MappedPulseReader::open(path)?.read_records()?,
        #[cfg(feature = "hdf5")]
        Format::Hdf5 => segevent_io::read_pulse_records_hdf5(path)?,
    };
    Ok(records)
}

fn read_events(path: &Path, fields: EventFields) -> Result<Vec<FormedEvent>> {
    let events = match Format::from_path(path)? {
        Format::Csv => read_events_csv(path)?,
        Format::Binary => read_events_binary(path, fields)?,
        #[cfg(feature = "hdf5")]
        Format::Hdf5 => segevent_io::read_events_hdf5(path)?,
    };
    log::info!("Read {} events from {}", events.len(), path.display());
    Ok(events)
}

fn write_events(
    path: &Path,
    format: Format,
    events: &[FormedEvent],
    fields: EventFields,
) -> Result<()> {
    match format {
        Format::Csv => EventFileWriter::create(path, fields)?.write_events_csv(events)?,
        Format::Binary => EventFileWriter::create(path, fields)?.write_events_binary(events)?,
        #[cfg(feature = "hdf5")]
        Format::Hdf5 => {
            let options = segevent_io::EventWriteOptions::default().with_fields(fields);
            segevent_io::write_events_hdf5(path, events, &options)?;
        }
    }
    log::info!("Wrote {} events to {}", events.len(), path.display());
    Ok(())
}

fn print_formation(stats: &FormationStatistics) {
    println!("Pulses: {}", stats.pulses_seen);
    println!("Self-triggers: {}", stats.self_triggers);
    println!("Out-of-order pulses: {}", stats.out_of_order_pulses);
    println!("Events: {}", stats.events_emitted);
    println!("Dropped: {}", stats.events_dropped);
    if stats.fits_attempted > 0 {
        println!(
            "Fits: {} attempted, {} failed",
            stats.fits_attempted, stats.fits_failed
        );
    }
}

fn print_correlation(stats: &CorrelationStatistics) {
    println!("Boundary candidates: {}", stats.boundary_candidates);
    println!("Merged pairs: {}", stats.merges);
    println!("Dropped incomplete: {}", stats.dropped_incomplete);
    println!("Events out: {}", stats.events_out);
}
