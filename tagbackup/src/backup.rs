//! Backup: read every tag under a root node and write them to a record file.
//!
//! The file starts with the `Index,RelativePath,Value,DataType` header.
//! Scalars are one record with an empty index; arrays are a marker record
//! followed by their elements (see [`crate::core::array`]). Entries that
//! cannot be represented are logged and skipped; the rest are still written.

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::array::{self, ArrayError, Shape, TagArray};
use crate::core::record::{Record, RecordFormat};
use crate::core::value_codec;
use crate::error::{Error, Result};
use crate::io::config::TransferOptions;
use crate::io::record_file::RecordWriter;
use crate::io::remote::{RemoteTag, RemoteValue, TagClient};

/// Path segment of host-maintained array metadata nodes.
const ARRAY_DIMENSIONS: &str = "ArrayDimensions";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupSummary {
    /// Tags written to the file.
    pub written: usize,
    /// Tags left out with a warning.
    pub skipped: usize,
    /// Array metadata nodes left out silently.
    pub excluded: usize,
}

#[derive(Debug, Error)]
enum SkipReason {
    #[error("value is null")]
    Null,
    #[error("array has no elements, its element type cannot be recorded")]
    EmptyArray,
    #[error(transparent)]
    Rejected(Error),
    #[error("inconsistent array from host: {0}")]
    Inconsistent(ArrayError),
    #[error("field {0:?} cannot be written with the configured delimiter")]
    Unrepresentable(String),
}

#[instrument(skip_all, fields(root = %options.root, csv_path = %options.csv_path.display()))]
pub fn run_backup<C: TagClient + ?Sized>(
    options: &TransferOptions,
    client: &C,
) -> Result<BackupSummary> {
    if options.format.delimiter == '.' {
        warn!("delimiter '.' is rejected by restore, this backup cannot be restored");
    }

    let tags = client.read_children(&options.root, options.timeout)?;
    debug!(count = tags.len(), "tags read");

    let mut writer = RecordWriter::create(&options.csv_path, options.format)?;
    writer.write_record(&Record::header().fields())?;

    let mut summary = BackupSummary::default();
    for tag in &tags {
        if tag.relative_path.contains(ARRAY_DIMENSIONS) {
            debug!(path = %tag.relative_path, "excluding array dimension node");
            summary.excluded += 1;
            continue;
        }
        match entry_records(tag, &options.format) {
            Ok(records) => {
                for record in &records {
                    writer.write_record(&record.fields())?;
                }
                summary.written += 1;
            }
            Err(reason) => {
                warn!(path = %tag.relative_path, %reason, "skipping tag");
                summary.skipped += 1;
            }
        }
    }

    let lines = writer.finish()?;
    info!(
        written = summary.written,
        skipped = summary.skipped,
        excluded = summary.excluded,
        lines,
        "backup finished"
    );
    Ok(summary)
}

/// All records for one tag, built before anything is written.
fn entry_records(
    tag: &RemoteTag,
    format: &RecordFormat,
) -> std::result::Result<Vec<Record>, SkipReason> {
    let path = tag.relative_path.as_str();
    let records = match &tag.value {
        RemoteValue::Null => return Err(SkipReason::Null),
        RemoteValue::Unmapped { type_name } => {
            return Err(SkipReason::Rejected(Error::UnmappedType {
                path: path.to_string(),
                type_name: type_name.clone(),
            }));
        }
        RemoteValue::Scalar(value) => vec![Record::new(
            "",
            path,
            value_codec::encode(value),
            value.value_type().name(),
        )],
        RemoteValue::Array {
            element_type,
            dimensions,
            elements,
        } => {
            let shape = Shape::from_dimensions(dimensions).map_err(|_| {
                SkipReason::Rejected(Error::UnsupportedRank {
                    path: path.to_string(),
                    rank: dimensions.len(),
                })
            })?;
            let array = TagArray::new(shape, *element_type, elements.clone())
                .map_err(SkipReason::Inconsistent)?;
            if array.is_empty() {
                return Err(SkipReason::EmptyArray);
            }
            array::flatten(path, &array)
        }
    };

    if let Some(field) = records
        .iter()
        .flat_map(Record::fields)
        .find(|field| !format.representable(field))
    {
        return Err(SkipReason::Unrepresentable(field.to_string()));
    }
    Ok(records)
}
