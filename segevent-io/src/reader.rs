//! Pulse and event readers.
//!

use crate::record::{
    decode_event, EventFields, PulseRecord, BOUNDARY_DT_COLUMN, EVENT_COLUMNS, FIT_COLUMNS,
    PULSE_RECORD_SIZE,
};
use crate::{Error, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use memmap2::Mmap;
use rayon::prelude::*;
use segevent_core::{FormedEvent, RawPulse};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file into
/// memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the mapping was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_record_size(&self, size: usize) -> Result<()> {
        if self.len() % size != 0 {
            return Err(Error::InvalidFormat(format!(
                "file size {} is not a multiple of {size} (file: {})",
                self.len(),
                self.path.display()
            )));
        }
        Ok(())
    }
}

/// Reader for files of fixed-width binary pulse records.
pub struct MappedPulseReader {
    reader: MappedFileReader,
}

impl MappedPulseReader {
    /// Opens a binary pulse file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped or its size is not a
    /// whole number of records.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        reader.check_record_size(PULSE_RECORD_SIZE)?;
        Ok(Self { reader })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Number of records in the file.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.reader.len() / PULSE_RECORD_SIZE
    }

    /// Decodes every record in parallel, preserving file order.
    ///
    /// # Errors
    /// Returns an error if a record cannot be decoded.
    pub fn read_records(&self) -> Result<Vec<PulseRecord>> {
        self.reader
            .as_bytes()
            .par_chunks_exact(PULSE_RECORD_SIZE)
            .map(PulseRecord::decode)
            .collect()
    }

    /// Decodes every record into a pulse tagged with its row.
    ///
    /// # Errors
    /// Returns an error if a record cannot be decoded.
    pub fn read_pulses(&self) -> Result<Vec<RawPulse>> {
        let pulses: Vec<RawPulse> = self
            .reader
            .as_bytes()
            .par_chunks_exact(PULSE_RECORD_SIZE)
            .enumerate()
            .map(|(row, bytes)| PulseRecord::decode(bytes).map(|r| r.to_pulse(row as u64)))
            .collect::<Result<_>>()?;
        debug!(
            "decoded {} pulses from {}",
            pulses.len(),
            self.reader.path().display()
        );
        Ok(pulses)
    }

    /// Sequential iterator over the decoded records.
    pub fn iter_records(&self) -> impl Iterator<Item = Result<PulseRecord>> + '_ {
        self.reader
            .as_bytes()
            .chunks_exact(PULSE_RECORD_SIZE)
            .map(PulseRecord::decode)
    }
}

/// Reads a binary pulse file into pulses.
///
/// # Errors
/// Returns an error if the file cannot be mapped or decoded.
pub fn read_pulses_binary<P: AsRef<Path>>(path: P) -> Result<Vec<RawPulse>> {
    MappedPulseReader::open(path)?.read_pulses()
}

/// Writes pulse records in the binary layout read by [`MappedPulseReader`].
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_pulses_binary<P: AsRef<Path>>(path: P, records: &[PulseRecord]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        writer.write_all(&record.encode())?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads binary event records laid out per `fields`.
///
/// # Errors
/// Returns an error if the file size is not a whole number of records.
pub fn read_events_binary<P: AsRef<Path>>(
    path: P,
    fields: EventFields,
) -> Result<Vec<FormedEvent>> {
    let reader = MappedFileReader::open(path)?;
    let size = fields.record_size();
    reader.check_record_size(size)?;
    Ok(reader
        .as_bytes()
        .par_chunks_exact(size)
        .map(|bytes| decode_event(bytes, fields))
        .collect())
}

/// Column lookup for a header-driven CSV file.
struct CsvHeader {
    columns: HashMap<String, usize>,
}

impl CsvHeader {
    fn new(headers: &StringRecord) -> Self {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim_start_matches('\u{feff}').to_string(), i))
            .collect();
        Self { columns }
    }

    fn has(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    fn require(&self, names: &[&str]) -> Result<()> {
        match names.iter().find(|name| !self.has(name)) {
            Some(name) => Err(Error::MissingField((*name).to_string())),
            None => Ok(()),
        }
    }

    fn get<T: FromStr>(&self, row: &StringRecord, name: &str) -> Result<T> {
        let index = self
            .columns
            .get(name)
            .ok_or_else(|| Error::MissingField(name.to_string()))?;
        let text = row.get(*index).unwrap_or("");
        text.parse().map_err(|_| Error::Parse {
            line: record_line(row),
            field: name.to_string(),
            value: text.to_string(),
        })
    }

    fn get_or<T: FromStr>(&self, row: &StringRecord, name: &str, default: T) -> Result<T> {
        if self.has(name) {
            self.get(row, name)
        } else {
            Ok(default)
        }
    }
}

/// 1-based line on which `row` starts.
fn record_line(row: &StringRecord) -> usize {
    row.position()
        .map_or(0, |pos| usize::try_from(pos.line()).unwrap_or(usize::MAX))
}

/// Reads a CSV file, handing each data record to `parse`.
fn read_csv<P, T, F>(path: P, required: &[&str], mut parse: F) -> Result<Vec<T>>
where
    P: AsRef<Path>,
    F: FnMut(&CsvHeader, &StringRecord) -> Result<T>,
{
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(&path)?;
    let headers = reader.headers()?;
    if headers.is_empty() {
        return Err(Error::InvalidFormat(format!(
            "{} has no header line",
            path.as_ref().display()
        )));
    }
    let header = CsvHeader::new(headers);
    header.require(required)?;

    let mut out = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(str::is_empty) {
            continue;
        }
        out.push(parse(&header, &row)?);
    }
    Ok(out)
}

const PULSE_REQUIRED: [&str; 6] = ["xpos", "ypos", "amp", "time", "eventID", "mcpdID"];

/// Reads raw pulse records from CSV.
///
/// Columns are matched by name; `eventTS`, `status` and `param0..3` are
/// optional.
///
/// # Errors
/// Returns an error on missing columns or unparsable values.
pub fn read_pulse_records_csv<P: AsRef<Path>>(path: P) -> Result<Vec<PulseRecord>> {
    read_csv(path, &PULSE_REQUIRED, |h, row| {
        Ok(PulseRecord {
            xpos: h.get(row, "xpos")?,
            ypos: h.get(row, "ypos")?,
            amp: h.get(row, "amp")?,
            time: h.get(row, "time")?,
            event_id: h.get(row, "eventID")?,
            event_ts: h.get_or(row, "eventTS", 0)?,
            mcpd_id: h.get(row, "mcpdID")?,
            status: h.get_or(row, "status", 0)?,
            params: [
                h.get_or(row, "param0", 0)?,
                h.get_or(row, "param1", 0)?,
                h.get_or(row, "param2", 0)?,
                h.get_or(row, "param3", 0)?,
            ],
        })
    })
}

/// Reads pulses from CSV, tagging each with its data row.
///
/// # Errors
/// Returns an error on missing columns or unparsable values.
pub fn read_pulses_csv<P: AsRef<Path>>(path: P) -> Result<Vec<RawPulse>> {
    let records = read_pulse_records_csv(path)?;
    Ok(records
        .iter()
        .zip(0u64..)
        .map(|(record, row)| record.to_pulse(row))
        .collect())
}

/// Reads formed events from CSV.
///
/// `xfit`/`yfit` default to the centroids and `boundtime` to absent when the
/// columns are missing.
///
/// # Errors
/// Returns an error on missing columns or unparsable values.
pub fn read_events_csv<P: AsRef<Path>>(path: P) -> Result<Vec<FormedEvent>> {
    read_csv(path, &EVENT_COLUMNS, |h, row| {
        let x: f64 = h.get(row, "xpos")?;
        let y: f64 = h.get(row, "ypos")?;
        let boundary_dt = if h.has(BOUNDARY_DT_COLUMN) {
            Some(h.get(row, BOUNDARY_DT_COLUMN)?)
        } else {
            None
        };
        Ok(FormedEvent {
            x,
            y,
            tot_x: h.get(row, "ToTx")?,
            tot_y: h.get(row, "ToTy")?,
            mult_x: h.get(row, "multx")?,
            mult_y: h.get(row, "multy")?,
            width_x: h.get(row, "widthx")?,
            width_y: h.get(row, "widthy")?,
            time: h.get(row, "time")?,
            dtime: h.get(row, "dtime")?,
            source_index: h.get(row, "rawevtnum")?,
            segment: h.get(row, "seg")?,
            x_fit: h.get_or(row, FIT_COLUMNS[0], x)?,
            y_fit: h.get_or(row, FIT_COLUMNS[1], y)?,
            boundary_dt,
        })
    })
}
