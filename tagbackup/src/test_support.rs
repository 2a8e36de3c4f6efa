//! Test-only tag clients and fixtures.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::core::array::{Shape, TagArray};
use crate::core::record::RecordFormat;
use crate::core::types::{ScalarValue, TagEntry, TagValue, ValueType};
use crate::io::config::TransferOptions;
use crate::io::remote::{RemoteError, RemoteTag, RemoteValue, TagClient};

/// In-memory tag tree for a single root.
///
/// Writes update the stored values and are recorded batch by batch.
pub struct MemoryTagClient {
    root: String,
    tags: Mutex<Vec<RemoteTag>>,
    writes: Mutex<Vec<Vec<TagEntry>>>,
    calls: AtomicUsize,
    write_error: Option<RemoteError>,
    read_delay: Option<Duration>,
}

impl MemoryTagClient {
    pub fn new(root: &str, tags: Vec<RemoteTag>) -> Self {
        Self {
            root: root.to_string(),
            tags: Mutex::new(tags),
            writes: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            write_error: None,
            read_delay: None,
        }
    }

    /// Same paths as `tags`, every value null.
    pub fn empty_like(root: &str, tags: &[RemoteTag]) -> Self {
        Self::new(
            root,
            tags.iter()
                .map(|tag| RemoteTag::new(tag.relative_path.clone(), RemoteValue::Null))
                .collect(),
        )
    }

    /// Every `write_children` call fails with `err` and changes nothing.
    pub fn failing_writes(mut self, err: RemoteError) -> Self {
        self.write_error = Some(err);
        self
    }

    /// `read_children` sleeps before answering.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn tags(&self) -> Vec<RemoteTag> {
        self.tags.lock().expect("tags lock").clone()
    }

    pub fn value_of(&self, path: &str) -> Option<RemoteValue> {
        self.tags()
            .into_iter()
            .find(|tag| tag.relative_path == path)
            .map(|tag| tag.value)
    }

    pub fn writes(&self) -> Vec<Vec<TagEntry>> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_root(&self, root: &str) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if root == self.root {
            Ok(())
        } else {
            Err(RemoteError::UnknownRoot(root.to_string()))
        }
    }
}

impl TagClient for MemoryTagClient {
    fn read_children(&self, root: &str, _timeout: Duration) -> Result<Vec<RemoteTag>, RemoteError> {
        self.check_root(root)?;
        if let Some(delay) = self.read_delay {
            thread::sleep(delay);
        }
        Ok(self.tags())
    }

    fn browse(&self, root: &str, _timeout: Duration) -> Result<BTreeSet<String>, RemoteError> {
        self.check_root(root)?;
        Ok(self
            .tags()
            .into_iter()
            .map(|tag| tag.relative_path)
            .collect())
    }

    fn write_children(
        &self,
        root: &str,
        values: &[TagEntry],
        _timeout: Duration,
    ) -> Result<(), RemoteError> {
        self.check_root(root)?;
        if let Some(err) = &self.write_error {
            return Err(err.clone());
        }
        let mut tags = self.tags.lock().expect("tags lock");
        for entry in values {
            let slot = tags
                .iter_mut()
                .find(|tag| tag.relative_path == entry.relative_path)
                .ok_or_else(|| RemoteError::UnknownTag {
                    root: root.to_string(),
                    path: entry.relative_path.clone(),
                })?;
            slot.value = remote_value(&entry.value);
        }
        self.writes
            .lock()
            .expect("writes lock")
            .push(values.to_vec());
        Ok(())
    }
}

/// Host-side view of a value written by restore.
pub fn remote_value(value: &TagValue) -> RemoteValue {
    match value {
        TagValue::Scalar(scalar) => RemoteValue::Scalar(scalar.clone()),
        TagValue::Array(array) => RemoteValue::Array {
            element_type: array.element_type(),
            dimensions: array.shape().dimensions(),
            elements: array.elements().to_vec(),
        },
    }
}

/// Options for root `Plant` with a one second timeout.
pub fn options_for(csv_path: PathBuf, format: RecordFormat) -> TransferOptions {
    TransferOptions {
        root: "Plant".to_string(),
        csv_path,
        format,
        timeout: Duration::from_secs(1),
        ignore_malformed_lines: false,
    }
}

/// A plant covering every supported value type and shape.
#[allow(clippy::approx_constant)]
pub fn sample_tags() -> Vec<RemoteTag> {
    let grid = TagArray::new(
        Shape::Matrix {
            rows: 2,
            columns: 3,
        },
        ValueType::Float32,
        [0.5f32, -1.25, 3.4e38, 1.0e-7, f32::NAN, 0.1]
            .into_iter()
            .map(ScalarValue::Float32)
            .collect(),
    )
    .expect("grid");

    vec![
        RemoteTag::new(
            "Tank.Level",
            RemoteValue::Scalar(ScalarValue::Float64(3.14159265358979)),
        ),
        RemoteTag::new(
            "Line.Setpoints",
            RemoteValue::Array {
                element_type: ValueType::Int32,
                dimensions: vec![3],
                elements: vec![
                    ScalarValue::Int32(1),
                    ScalarValue::Int32(2),
                    ScalarValue::Int32(3),
                ],
            },
        ),
        RemoteTag::new("Oven.Grid", remote_value(&TagValue::Array(grid))),
        RemoteTag::new("Pump.On", RemoteValue::Scalar(ScalarValue::Bool(true))),
        RemoteTag::new("Pump.Mode", RemoteValue::Scalar(ScalarValue::Int8(-3))),
        RemoteTag::new("Pump.Runs", RemoteValue::Scalar(ScalarValue::UInt16(65535))),
        RemoteTag::new(
            "Counter.Total",
            RemoteValue::Scalar(ScalarValue::UInt64(u64::MAX)),
        ),
        RemoteTag::new(
            "Counter.Delta",
            RemoteValue::Scalar(ScalarValue::Int64(i64::MIN)),
        ),
        RemoteTag::new(
            "Recipe.Name",
            RemoteValue::Scalar(ScalarValue::String("Mix \"A\", fast; hot".to_string())),
        ),
        RemoteTag::new(
            "Batch.Started",
            RemoteValue::Scalar(ScalarValue::Timestamp(
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45)
                    .single()
                    .expect("timestamp")
                    + chrono::Duration::nanoseconds(123_456_789),
            )),
        ),
        RemoteTag::new(
            "Line.Setpoints.ArrayDimensions",
            RemoteValue::Scalar(ScalarValue::UInt32(3)),
        ),
    ]
}
