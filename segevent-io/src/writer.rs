//! File writers for formed events.

use crate::record::{encode_event, EventFields};
use crate::Result;
use segevent_core::FormedEvent;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writer for formed event output.
pub struct EventFileWriter {
    writer: BufWriter<File>,
    fields: EventFields,
}

impl EventFileWriter {
    /// Creates a new file writer with the given optional columns.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, fields: EventFields) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer, fields })
    }

    /// Optional columns this writer emits.
    #[must_use]
    pub fn fields(&self) -> EventFields {
        self.fields
    }

    /// Writes events as CSV with a header line.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_events_csv(&mut self, events: &[FormedEvent]) -> Result<()> {
        writeln!(self.writer, "{}", self.fields.columns().join(","))?;

        for e in events {
            write!(
                self.writer,
                "{},{},{},{},{},{},{},{},{},{},{},{}",
                e.x,
                e.y,
                e.tot_x,
                e.tot_y,
                e.mult_x,
                e.mult_y,
                e.time,
                e.source_index,
                e.segment,
                e.width_x,
                e.width_y,
                e.dtime
            )?;
            if self.fields.fit {
                write!(self.writer, ",{},{}", e.x_fit, e.y_fit)?;
            }
            if self.fields.boundary_dt {
                write!(self.writer, ",{}", e.boundary_dt.unwrap_or(0))?;
            }
            writeln!(self.writer)?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes events as fixed-width little-endian records.
    ///
    /// Layout: see [`EVENT_RECORD_SIZE`](crate::record::EVENT_RECORD_SIZE);
    /// `xfit`, `yfit` (f64) and `boundtime` (u64) follow when selected.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_events_binary(&mut self, events: &[FormedEvent]) -> Result<()> {
        let mut buf = Vec::with_capacity(self.fields.record_size());
        for event in events {
            buf.clear();
            encode_event(event, self.fields, &mut buf);
            self.writer.write_all(&buf)?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::reader::{read_events_binary, read_events_csv};
    use segevent_core::MERGED_SEGMENT;
    use tempfile::NamedTempFile;

    fn events() -> Vec<FormedEvent> {
        vec![
            FormedEvent {
                x: 6.0,
                y: 12.25,
                tot_x: 20,
                tot_y: 4,
                mult_x: 2,
                mult_y: 1,
                width_x: 2,
                time: 1000,
                source_index: 3,
                segment: 1,
                x_fit: 6.0,
                y_fit: 12.25,
                ..Default::default()
            },
            FormedEvent {
                x: 127.5,
                y: 40.5,
                tot_x: 100,
                tot_y: 10,
                mult_x: 4,
                mult_y: 2,
                time: 2000,
                dtime: 1000,
                segment: MERGED_SEGMENT,
                x_fit: 127.4,
                y_fit: 40.5,
                boundary_dt: Some(3),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn test_write_events_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = EventFileWriter::create(file.path(), EventFields::default()).unwrap();
        writer.write_events_csv(&events()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("xpos,ypos,ToTx,ToTy,multx,multy,time,rawevtnum,seg,widthx,widthy,dtime")
        );
        assert_eq!(lines.next(), Some("6,12.25,20,4,2,1,1000,3,1,2,0,0"));
        assert!(content.contains("127.5,40.5,100,10,4,2,2000,0,-1,0,0,1000"));
    }

    #[test]
    fn test_csv_optional_columns_read_back() {
        let fields = EventFields {
            fit: true,
            boundary_dt: true,
        };
        let file = NamedTempFile::new().unwrap();
        let mut writer = EventFileWriter::create(file.path(), fields).unwrap();
        writer.write_events_csv(&events()).unwrap();

        let back = read_events_csv(file.path()).unwrap();
        assert_eq!(back[1].x_fit, 127.4);
        assert_eq!(back[1].boundary_dt, Some(3));
        // Unmerged events carry a zero boundary time once written.
        assert_eq!(back[0].boundary_dt, Some(0));
    }

    #[test]
    fn test_write_events_binary() {
        let fields = EventFields {
            fit: true,
            boundary_dt: false,
        };
        let file = NamedTempFile::new().unwrap();
        let mut writer = EventFileWriter::create(file.path(), fields).unwrap();
        writer.write_events_binary(&events()).unwrap();

        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(data.len(), 2 * 92);

        let back = read_events_binary(file.path(), fields).unwrap();
        assert_eq!(back[0], events()[0]);
        assert_eq!(back[1].x_fit, 127.4);
        assert!(back[1].boundary_dt.is_none());
        assert!(read_events_binary(file.path(), EventFields::default()).is_err());
    }
}
