//! HDF5 pulse and event I/O.
//!
//! Raw pulses live in a `rawdata` group with one 1-D dataset per column;
//! formed events are written to a `data` group the same way, using chunked
//! extendable datasets so they can be appended batch by batch.

use crate::record::{EventFields, PulseRecord, BOUNDARY_DT_COLUMN, FIT_COLUMNS};
use crate::{Error, Result};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use ndarray::{s, ArrayView1};
use segevent_core::{FormedEvent, RawPulse};
use std::path::Path;
use std::str::FromStr;

const RAW_GROUP: &str = "rawdata";
const EVENT_GROUP: &str = "data";
const DEFAULT_CHUNK: usize = 65_536;

/// Event write configuration.
#[derive(Clone, Debug)]
pub struct EventWriteOptions {
    /// Optional columns.
    pub fields: EventFields,
    /// Chunk length of each dataset.
    pub chunk_events: usize,
    /// Deflate level, if any.
    pub compression: Option<u8>,
    /// Enable the shuffle filter.
    pub shuffle: bool,
}

impl Default for EventWriteOptions {
    fn default() -> Self {
        Self {
            fields: EventFields::default(),
            chunk_events: DEFAULT_CHUNK,
            compression: Some(1),
            shuffle: true,
        }
    }
}

impl EventWriteOptions {
    /// Options writing the given optional columns.
    #[must_use]
    pub fn with_fields(mut self, fields: EventFields) -> Self {
        self.fields = fields;
        self
    }
}

/// Streaming writer for formed events.
pub struct Hdf5EventSink {
    _file: File,
    writer: EventWriter,
}

impl Hdf5EventSink {
    /// Create a new streaming event sink.
    ///
    /// # Errors
    /// Returns an error if the HDF5 file or datasets cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, options: &EventWriteOptions) -> Result<Self> {
        let file = File::create(path)?;
        set_attr_str_file(&file, "segevent_format_version", "0.1")?;
        let group = file.create_group(EVENT_GROUP)?;
        let writer = EventWriter::new(&group, options)?;
        Ok(Self {
            _file: file,
            writer,
        })
    }

    /// Append a batch of events.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn write_events(&mut self, events: &[FormedEvent]) -> Result<()> {
        self.writer.append(events)
    }

    /// Number of events written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writer.event_count
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writer.event_count == 0
    }
}

/// Writes events to a new HDF5 file.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_events_hdf5<P: AsRef<Path>>(
    path: P,
    events: &[FormedEvent],
    options: &EventWriteOptions,
) -> Result<()> {
    let mut sink = Hdf5EventSink::create(path, options)?;
    sink.write_events(events)
}

/// Reads events written by [`write_events_hdf5`] or [`Hdf5EventSink`].
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the datasets disagree in length.
pub fn read_events_hdf5<P: AsRef<Path>>(path: P) -> Result<Vec<FormedEvent>> {
    let file = File::open(path)?;
    let group = file.group(EVENT_GROUP)?;

    let x = read_dataset_vec::<f64>(&group, "xpos")?;
    let y = read_dataset_vec::<f64>(&group, "ypos")?;
    let tot_x = read_dataset_vec::<u64>(&group, "ToTx")?;
    let tot_y = read_dataset_vec::<u64>(&group, "ToTy")?;
    let mult_x = read_dataset_vec::<u32>(&group, "multx")?;
    let mult_y = read_dataset_vec::<u32>(&group, "multy")?;
    let time = read_dataset_vec::<u64>(&group, "time")?;
    let source_index = read_dataset_vec::<u64>(&group, "rawevtnum")?;
    let segment = read_dataset_vec::<i32>(&group, "seg")?;
    let width_x = read_dataset_vec::<u32>(&group, "widthx")?;
    let width_y = read_dataset_vec::<u32>(&group, "widthy")?;
    let dtime = read_dataset_vec::<u64>(&group, "dtime")?;
    let x_fit = read_dataset_vec_opt::<f64>(&group, FIT_COLUMNS[0])?;
    let y_fit = read_dataset_vec_opt::<f64>(&group, FIT_COLUMNS[1])?;
    let boundary_dt = read_dataset_vec_opt::<u64>(&group, BOUNDARY_DT_COLUMN)?;

    let n = x.len();
    let lengths = [
        y.len(),
        tot_x.len(),
        tot_y.len(),
        mult_x.len(),
        mult_y.len(),
        time.len(),
        source_index.len(),
        segment.len(),
        width_x.len(),
        width_y.len(),
        dtime.len(),
    ];
    let optional = [&x_fit, &y_fit]
        .into_iter()
        .flatten()
        .map(Vec::len)
        .chain(boundary_dt.as_ref().map(Vec::len));
    if lengths.into_iter().chain(optional).any(|len| len != n) {
        return Err(Error::InvalidFormat(
            "event datasets have different lengths".to_string(),
        ));
    }

    Ok((0..n)
        .map(|i| FormedEvent {
            x: x[i],
            y: y[i],
            tot_x: tot_x[i],
            tot_y: tot_y[i],
            mult_x: mult_x[i],
            mult_y: mult_y[i],
            width_x: width_x[i],
            width_y: width_y[i],
            time: time[i],
            dtime: dtime[i],
            source_index: source_index[i],
            segment: segment[i],
            x_fit: x_fit.as_ref().map_or(x[i], |v| v[i]),
            y_fit: y_fit.as_ref().map_or(y[i], |v| v[i]),
            boundary_dt: boundary_dt.as_ref().map(|v| v[i]),
        })
        .collect())
}

/// Reads raw pulse records from the `rawdata` group.
///
/// `eventTS`, `status` and `param0..3` are optional.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the datasets disagree in length.
pub fn read_pulse_records_hdf5<P: AsRef<Path>>(path: P) -> Result<Vec<PulseRecord>> {
    let file = File::open(path)?;
    let group = file.group(RAW_GROUP)?;

    let xpos = read_dataset_vec::<u16>(&group, "xpos")?;
    let ypos = read_dataset_vec::<u16>(&group, "ypos")?;
    let amp = read_dataset_vec::<u16>(&group, "amp")?;
    let time = read_dataset_vec::<u64>(&group, "time")?;
    let event_id = read_dataset_vec::<u8>(&group, "eventID")?;
    let mcpd_id = read_dataset_vec::<u8>(&group, "mcpdID")?;
    let event_ts = read_dataset_vec_opt::<u32>(&group, "eventTS")?;
    let status = read_dataset_vec_opt::<u8>(&group, "status")?;
    let params = [
        read_dataset_vec_opt::<u64>(&group, "param0")?,
        read_dataset_vec_opt::<u64>(&group, "param1")?,
        read_dataset_vec_opt::<u64>(&group, "param2")?,
        read_dataset_vec_opt::<u64>(&group, "param3")?,
    ];

    let n = xpos.len();
    if [ypos.len(), amp.len(), time.len(), event_id.len(), mcpd_id.len()]
        .into_iter()
        .any(|len| len != n)
    {
        return Err(Error::InvalidFormat(
            "pulse datasets have different lengths".to_string(),
        ));
    }
    (0..n)
        .map(|i| {
            Ok(PulseRecord {
                xpos: xpos[i],
                ypos: ypos[i],
                amp: amp[i],
                time: time[i],
                event_id: event_id[i],
                event_ts: optional_at(event_ts.as_deref(), i)?,
                mcpd_id: mcpd_id[i],
                status: optional_at(status.as_deref(), i)?,
                params: [
                    optional_at(params[0].as_deref(), i)?,
                    optional_at(params[1].as_deref(), i)?,
                    optional_at(params[2].as_deref(), i)?,
                    optional_at(params[3].as_deref(), i)?,
                ],
            })
        })
        .collect()
}

/// Reads raw pulses from the `rawdata` group, tagged with their row.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn read_pulses_hdf5<P: AsRef<Path>>(path: P) -> Result<Vec<RawPulse>> {
    let records = read_pulse_records_hdf5(path)?;
    Ok(records
        .iter()
        .zip(0u64..)
        .map(|(record, row)| record.to_pulse(row))
        .collect())
}

/// Writes pulse records to a `rawdata` group.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_pulse_records_hdf5<P: AsRef<Path>>(path: P, records: &[PulseRecord]) -> Result<()> {
    let file = File::create(path)?;
    set_attr_str_file(&file, "segevent_format_version", "0.1")?;
    let group = file.create_group(RAW_GROUP)?;
    let options = EventWriteOptions::default();

    write_column(&group, "xpos", records, &options, |r| r.xpos)?;
    write_column(&group, "ypos", records, &options, |r| r.ypos)?;
    write_column(&group, "amp", records, &options, |r| r.amp)?;
    write_column(&group, "time", records, &options, |r| r.time)?;
    write_column(&group, "eventID", records, &options, |r| r.event_id)?;
    write_column(&group, "eventTS", records, &options, |r| r.event_ts)?;
    write_column(&group, "mcpdID", records, &options, |r| r.mcpd_id)?;
    write_column(&group, "status", records, &options, |r| r.status)?;
    for (i, name) in ["param0", "param1", "param2", "param3"].iter().enumerate() {
        write_column(&group, name, records, &options, |r| r.params[i])?;
    }
    Ok(())
}

struct EventWriter {
    x: Dataset,
    y: Dataset,
    tot_x: Dataset,
    tot_y: Dataset,
    mult_x: Dataset,
    mult_y: Dataset,
    time: Dataset,
    source_index: Dataset,
    segment: Dataset,
    width_x: Dataset,
    width_y: Dataset,
    dtime: Dataset,
    fit: Option<(Dataset, Dataset)>,
    boundary_dt: Option<Dataset>,
    event_count: usize,
}

impl EventWriter {
    fn new(group: &Group, options: &EventWriteOptions) -> Result<Self> {
        let fit = if options.fields.fit {
            Some((
                create_extendable_dataset::<f64>(group, FIT_COLUMNS[0], options)?,
                create_extendable_dataset::<f64>(group, FIT_COLUMNS[1], options)?,
            ))
        } else {
            None
        };
        let boundary_dt = if options.fields.boundary_dt {
            Some(create_extendable_dataset::<u64>(
                group,
                BOUNDARY_DT_COLUMN,
                options,
            )?)
        } else {
            None
        };

        Ok(Self {
            x: create_extendable_dataset::<f64>(group, "xpos", options)?,
            y: create_extendable_dataset::<f64>(group, "ypos", options)?,
            tot_x: create_extendable_dataset::<u64>(group, "ToTx", options)?,
            tot_y: create_extendable_dataset::<u64>(group, "ToTy", options)?,
            mult_x: create_extendable_dataset::<u32>(group, "multx", options)?,
            mult_y: create_extendable_dataset::<u32>(group, "multy", options)?,
            time: create_extendable_dataset::<u64>(group, "time", options)?,
            source_index: create_extendable_dataset::<u64>(group, "rawevtnum", options)?,
            segment: create_extendable_dataset::<i32>(group, "seg", options)?,
            width_x: create_extendable_dataset::<u32>(group, "widthx", options)?,
            width_y: create_extendable_dataset::<u32>(group, "widthy", options)?,
            dtime: create_extendable_dataset::<u64>(group, "dtime", options)?,
            fit,
            boundary_dt,
            event_count: 0,
        })
    }

    fn append(&mut self, events: &[FormedEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let offset = self.event_count;

        append_slice(&self.x, offset, &collect(events, |e| e.x))?;
        append_slice(&self.y, offset, &collect(events, |e| e.y))?;
        append_slice(&self.tot_x, offset, &collect(events, |e| e.tot_x))?;
        append_slice(&self.tot_y, offset, &collect(events, |e| e.tot_y))?;
        append_slice(&self.mult_x, offset, &collect(events, |e| e.mult_x))?;
        append_slice(&self.mult_y, offset, &collect(events, |e| e.mult_y))?;
        append_slice(&self.time, offset, &collect(events, |e| e.time))?;
        append_slice(
            &self.source_index,
            offset,
            &collect(events, |e| e.source_index),
        )?;
        append_slice(&self.segment, offset, &collect(events, |e| e.segment))?;
        append_slice(&self.width_x, offset, &collect(events, |e| e.width_x))?;
        append_slice(&self.width_y, offset, &collect(events, |e| e.width_y))?;
        append_slice(&self.dtime, offset, &collect(events, |e| e.dtime))?;
        if let Some((x_fit, y_fit)) = &self.fit {
            append_slice(x_fit, offset, &collect(events, |e| e.x_fit))?;
            append_slice(y_fit, offset, &collect(events, |e| e.y_fit))?;
        }
        if let Some(boundary_dt) = &self.boundary_dt {
            append_slice(
                boundary_dt,
                offset,
                &collect(events, |e| e.boundary_dt.unwrap_or(0)),
            )?;
        }

        self.event_count += events.len();
        Ok(())
    }
}

fn collect<T>(events: &[FormedEvent], f: impl Fn(&FormedEvent) -> T) -> Vec<T> {
    events.iter().map(f).collect()
}

fn optional_at<T: Copy + Default>(column: Option<&[T]>, i: usize) -> Result<T> {
    match column {
        Some(values) => values
            .get(i)
            .copied()
            .ok_or_else(|| Error::InvalidFormat("pulse datasets have different lengths".into())),
        None => Ok(T::default()),
    }
}

fn write_column<T: H5Type>(
    group: &Group,
    name: &str,
    records: &[PulseRecord],
    options: &EventWriteOptions,
    f: impl Fn(&PulseRecord) -> T,
) -> Result<()> {
    let dataset = create_extendable_dataset::<T>(group, name, options)?;
    let values: Vec<T> = records.iter().map(f).collect();
    append_slice(&dataset, 0, &values)
}

fn create_extendable_dataset<T: H5Type>(
    group: &Group,
    name: &str,
    options: &EventWriteOptions,
) -> Result<Dataset> {
    let mut builder = group
        .new_dataset::<T>()
        .shape((0..,))
        .chunk((options.chunk_events,));

    if let Some(level) = options.compression {
        builder = builder.deflate(level);
    }

    if options.shuffle {
        builder = builder.shuffle();
    }

    Ok(builder.create(name)?)
}

fn append_slice<T: H5Type>(dataset: &Dataset, offset: usize, data: &[T]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let new_len = offset + data.len();
    dataset.resize((new_len,))?;
    let view = ArrayView1::from(data);
    dataset.write_slice(view, s![offset..new_len])?;
    Ok(())
}

fn set_attr_str_file(file: &File, name: &str, value: &str) -> Result<()> {
    let value = VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_dataset_vec<T: H5Type>(group: &Group, name: &str) -> Result<Vec<T>> {
    let dataset = group
        .dataset(name)
        .map_err(|_| Error::MissingField(name.to_string()))?;
    Ok(dataset.read_raw::<T>()?)
}

fn read_dataset_vec_opt<T: H5Type>(group: &Group, name: &str) -> Result<Option<Vec<T>>> {
    match group.dataset(name) {
        Ok(dataset) => Ok(Some(dataset.read_raw::<T>()?)),
        Err(_) => Ok(None),
    }
}
