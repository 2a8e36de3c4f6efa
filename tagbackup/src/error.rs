//! Error taxonomy for backup and restore runs.
//!
//! Per-entry problems (unmapped types, unsupported ranks) are reported to the
//! orchestrators as values and logged as skips; every other variant aborts
//! the whole operation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::array::ArrayError;
use crate::core::value_codec::ValueError;
use crate::io::remote::RemoteError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid option; raised before any file or remote I/O.
    #[error("configuration error: {option}: {reason}")]
    Configuration {
        option: &'static str,
        reason: String,
    },

    /// Malformed record, with 1-based line and column.
    #[error("error processing line {line}, column {column}: {reason}")]
    Format {
        line: usize,
        column: usize,
        reason: String,
    },

    #[error("malformed array block at line {line}: {cause}")]
    MalformedArray { line: usize, cause: ArrayError },

    #[error("line {line}: type not found: {type_name} (value {raw:?})")]
    UnsupportedType {
        line: usize,
        type_name: String,
        raw: String,
    },

    #[error("line {line}: {cause}")]
    InvalidValue { line: usize, cause: ValueError },

    /// Runtime type of a tag has no canonical type name.
    #[error("no type mapping for {type_name} in tag {path}")]
    UnmappedType { path: String, type_name: String },

    #[error("tag {path}: only one- and two-dimensional arrays are supported, found rank {rank}")]
    UnsupportedRank { path: String, rank: usize },

    #[error("CSV file {} is empty", path.display())]
    EmptyInput { path: PathBuf },

    #[error("unexpected header {found:?}, expected Index,RelativePath,Value,DataType")]
    BadHeader { found: Vec<String> },

    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("{context}: {cause}")]
    Io { context: String, cause: io::Error },

    #[error("{job} job panicked")]
    JobPanicked { job: String },
}

impl Error {
    pub fn io(context: impl Into<String>, cause: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            cause,
        }
    }

    pub fn config(option: &'static str, reason: impl Into<String>) -> Self {
        Error::Configuration {
            option,
            reason: reason.into(),
        }
    }

    /// Lift a value decoding failure found on `line`.
    pub fn from_value(line: usize, cause: ValueError) -> Self {
        match cause {
            ValueError::UnsupportedType { type_name, raw } => Error::UnsupportedType {
                line,
                type_name,
                raw,
            },
            cause @ ValueError::InvalidValue { .. } => Error::InvalidValue { line, cause },
        }
    }

    /// Lift an array reconstruction failure for the block starting on `line`.
    ///
    /// Element decode failures keep their value-level classification.
    pub fn from_array(line: usize, cause: ArrayError) -> Self {
        match cause {
            ArrayError::Value(value) => Error::from_value(line, value),
            cause => Error::MalformedArray { line, cause },
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }
}
