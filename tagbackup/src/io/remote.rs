//! Collaborator interface to the remote tag layer.
//!
//! The [`TagClient`] trait decouples the orchestrators from the host that
//! actually owns the tags. Tests use an in-memory client; the binary uses
//! the JSON tag store or the bridge command.

use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;

use crate::core::types::{ScalarValue, TagEntry, ValueType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("root node {0:?} not found")]
    UnknownRoot(String),
    #[error("tag {path:?} not found under {root:?}")]
    UnknownTag { root: String, path: String },
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Current value of a tag as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    Null,
    Scalar(ScalarValue),
    /// Any-rank array; ranks other than 1 and 2 are rejected at backup.
    Array {
        element_type: ValueType,
        dimensions: Vec<usize>,
        elements: Vec<ScalarValue>,
    },
    /// The host type has no canonical value type name.
    Unmapped { type_name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTag {
    pub relative_path: String,
    pub value: RemoteValue,
}

impl RemoteTag {
    pub fn new(relative_path: impl Into<String>, value: RemoteValue) -> Self {
        Self {
            relative_path: relative_path.into(),
            value,
        }
    }
}

/// Bounded-time bulk access to the tags under a root node.
pub trait TagClient {
    /// Read every tag under `root` in one call.
    fn read_children(&self, root: &str, timeout: Duration) -> Result<Vec<RemoteTag>, RemoteError>;

    /// Relative paths that resolve under `root`.
    fn browse(&self, root: &str, timeout: Duration) -> Result<BTreeSet<String>, RemoteError>;

    /// Write the whole batch in one call.
    fn write_children(
        &self,
        root: &str,
        values: &[TagEntry],
        timeout: Duration,
    ) -> Result<(), RemoteError>;
}
