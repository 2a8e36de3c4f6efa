//! Restore: read a record file and write every resolvable value back in one
//! batch.
//!
//! Paths that do not resolve under the root are skipped rather than failing
//! the run. The summary counts them, since a missing tag and a transient
//! lookup problem look the same from here.

use std::collections::BTreeSet;
use std::io::BufRead;

use tracing::{debug, info, instrument, warn};

use crate::core::array::{self, ArrayError, Shape};
use crate::core::record::{HEADER, Record, RecordKind};
use crate::core::types::{TagEntry, TagValue};
use crate::core::value_codec::{self, ValueError};
use crate::error::{Error, Result};
use crate::io::config::TransferOptions;
use crate::io::record_file::RecordReader;
use crate::io::remote::TagClient;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Entries included in the write batch.
    pub restored: usize,
    /// Entries whose path does not resolve under the root.
    pub skipped_unresolved: usize,
    /// Lines and entries dropped under `ignore_malformed_lines`.
    pub skipped_malformed: usize,
    /// Zero-element array blocks.
    pub skipped_empty: usize,
}

impl RestoreSummary {
    pub fn skipped(&self) -> usize {
        self.skipped_unresolved + self.skipped_malformed + self.skipped_empty
    }

    pub fn total(&self) -> usize {
        self.restored + self.skipped()
    }
}

#[instrument(skip_all, fields(root = %options.root, csv_path = %options.csv_path.display()))]
pub fn run_restore<C: TagClient + ?Sized>(
    options: &TransferOptions,
    client: &C,
) -> Result<RestoreSummary> {
    if options.format.delimiter == '.' {
        return Err(Error::config(
            "delimiter",
            "'.' cannot be used to restore, it separates path segments",
        ));
    }

    let resolvable = client.browse(&options.root, options.timeout)?;
    debug!(count = resolvable.len(), "paths resolvable under root");

    let mut reader = RecordReader::open(
        &options.csv_path,
        options.format,
        options.ignore_malformed_lines,
    )?;
    let header = reader.read_record()?.ok_or_else(|| Error::EmptyInput {
        path: options.csv_path.clone(),
    })?;
    if header != HEADER {
        return Err(Error::BadHeader { found: header });
    }

    let mut restore = Restore {
        resolvable: &resolvable,
        ignore_malformed_lines: options.ignore_malformed_lines,
        batch: Vec::new(),
        summary: RestoreSummary::default(),
    };
    while let Some(fields) = reader.read_record()? {
        let line = reader.last_line();
        let record = match Record::from_fields(fields) {
            Ok(record) => record,
            Err(err) => {
                restore.tolerate(Error::Format {
                    line,
                    column: err.column(),
                    reason: err.to_string(),
                })?;
                continue;
            }
        };
        match record.kind() {
            RecordKind::Scalar => restore.scalar(record, line)?,
            RecordKind::ArrayMarker => {
                let block = read_block(&mut reader, record, line);
                restore.array(block, line)?;
            }
            RecordKind::Unknown => restore.tolerate(Error::Format {
                line,
                column: 1,
                reason: format!("unexpected index {:?}", record.index),
            })?,
        }
    }
    restore.summary.skipped_malformed += reader.skipped_lines();

    let Restore { batch, summary, .. } = restore;
    client.write_children(&options.root, &batch, options.timeout)?;

    info!(
        restored = summary.restored,
        skipped_unresolved = summary.skipped_unresolved,
        skipped_malformed = summary.skipped_malformed,
        skipped_empty = summary.skipped_empty,
        "restore finished"
    );
    if summary.skipped() > 0 {
        warn!(
            "{} of {} entries skipped, see earlier log lines for each path",
            summary.skipped(),
            summary.total()
        );
    }
    Ok(summary)
}

struct Restore<'a> {
    resolvable: &'a BTreeSet<String>,
    ignore_malformed_lines: bool,
    batch: Vec<TagEntry>,
    summary: RestoreSummary,
}

impl Restore<'_> {
    fn scalar(&mut self, record: Record, line: usize) -> Result<()> {
        if !self.resolves(&record.relative_path, line) {
            return Ok(());
        }
        match value_codec::decode_named(&record.value, &record.data_type) {
            Ok(value) => {
                self.push(TagEntry::new(record.relative_path, TagValue::Scalar(value)));
                Ok(())
            }
            Err(err @ ValueError::UnsupportedType { .. }) => Err(Error::from_value(line, err)),
            Err(err) => self.tolerate(Error::from_value(line, err)),
        }
    }

    fn array(&mut self, block: Result<Option<Vec<Record>>>, line: usize) -> Result<()> {
        let Some(block) = block? else {
            debug!(line, "skipping array block without elements");
            self.summary.skipped_empty += 1;
            return Ok(());
        };
        // Unresolved blocks are checked for layout only, never decoded.
        let (_, owner) = array::block_layout(&block).map_err(|err| Error::from_array(line, err))?;
        if !self.resolves(owner, line) {
            return Ok(());
        }
        match array::reconstruct(&block) {
            Ok((path, array)) => {
                self.push(TagEntry::new(path, TagValue::Array(array)));
                Ok(())
            }
            Err(ArrayError::Value(err @ ValueError::InvalidValue { .. })) => {
                self.tolerate(Error::from_value(line, err))
            }
            Err(err) => Err(Error::from_array(line, err)),
        }
    }

    fn resolves(&mut self, path: &str, line: usize) -> bool {
        if self.resolvable.contains(path) {
            return true;
        }
        debug!(path, line, "path does not resolve under root, skipping");
        self.summary.skipped_unresolved += 1;
        false
    }

    fn push(&mut self, entry: TagEntry) {
        self.batch.push(entry);
        self.summary.restored += 1;
    }

    /// Skip the entry when malformed lines are tolerated, fail otherwise.
    fn tolerate(&mut self, err: Error) -> Result<()> {
        if !self.ignore_malformed_lines {
            return Err(err);
        }
        warn!(error = %err, "skipping malformed entry");
        self.summary.skipped_malformed += 1;
        Ok(())
    }
}

/// Consume the marker's element records. `None` for a zero-element marker.
fn read_block<R: BufRead>(
    reader: &mut RecordReader<R>,
    marker: Record,
    line: usize,
) -> Result<Option<Vec<Record>>> {
    let shape = Shape::parse_marker(&marker.index).map_err(|err| Error::from_array(line, err))?;
    let expected = shape.element_count();
    if expected == 0 {
        return Ok(None);
    }

    let mut block = vec![marker];
    while block.len() <= expected {
        let Some(fields) = reader.read_record()? else {
            return Err(Error::from_array(
                line,
                ArrayError::ElementCount {
                    expected,
                    found: block.len() - 1,
                },
            ));
        };
        let record = Record::from_fields(fields).map_err(|err| Error::Format {
            line: reader.last_line(),
            column: err.column(),
            reason: err.to_string(),
        })?;
        block.push(record);
    }
    Ok(Some(block))
}
