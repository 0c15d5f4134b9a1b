//! segevent-io: Record I/O for segevent.
//!
//! This crate reads raw pulse records and reads/writes formed events as
//! header-driven CSV, fixed-width binary (memory-mapped via memmap2) and,
//! with the `hdf5` feature, HDF5.
//!

mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod reader;
pub mod record;
mod writer;

pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use hdf5::{
    read_events_hdf5, read_pulse_records_hdf5, read_pulses_hdf5, write_events_hdf5,
    write_pulse_records_hdf5, EventWriteOptions, Hdf5EventSink,
};
pub use reader::{
    read_events_binary, read_events_csv, read_pulse_records_csv, read_pulses_binary,
    read_pulses_csv, write_pulses_binary, MappedFileReader, MappedPulseReader,
};
pub use record::{EventFields, PulseRecord, PULSE_RECORD_SIZE};
pub use writer::EventFileWriter;
