//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// CSV reader error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column or dataset is absent.
    #[error("missing field: {0}")]
    MissingField(String),

    /// A value could not be parsed.
    #[error("line {line}: cannot parse {field} from {value:?}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Column name.
        field: String,
        /// Offending text.
        value: String,
    },

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] segevent_core::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}
