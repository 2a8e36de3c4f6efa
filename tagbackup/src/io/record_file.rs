//! Line-oriented record reading and writing over files.
//!
//! Field splitting lives in [`RecordFormat`]; this module owns line
//! numbering, terminators, malformed-line skipping and flushing.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::warn;

use crate::core::record::RecordFormat;
use crate::error::{Error, Result};

const BYTE_ORDER_MARK: char = '\u{feff}';

pub struct RecordReader<R> {
    reader: R,
    format: RecordFormat,
    ignore_malformed_lines: bool,
    line_number: usize,
    last_line: usize,
    skipped: usize,
    buf: String,
}

impl RecordReader<BufReader<File>> {
    pub fn open(path: &Path, format: RecordFormat, ignore_malformed_lines: bool) -> Result<Self> {
        let file =
            File::open(path).map_err(|err| Error::io(format!("open {}", path.display()), err))?;
        Ok(Self::new(
            BufReader::new(file),
            format,
            ignore_malformed_lines,
        ))
    }
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R, format: RecordFormat, ignore_malformed_lines: bool) -> Self {
        Self {
            reader,
            format,
            ignore_malformed_lines,
            line_number: 0,
            last_line: 0,
            skipped: 0,
            buf: String::new(),
        }
    }

    /// True when no bytes remain; does not consume anything.
    pub fn end_of_input(&mut self) -> Result<bool> {
        let available = self
            .reader
            .fill_buf()
            .map_err(|err| Error::io(format!("read line {}", self.line_number + 1), err))?;
        Ok(available.is_empty())
    }

    /// Next record's fields, or `None` at end of input.
    ///
    /// Malformed lines are a [`Error::Format`] unless the reader was built
    /// with `ignore_malformed_lines`, in which case they are logged and
    /// skipped.
    pub fn read_record(&mut self) -> Result<Option<Vec<String>>> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_line(&mut self.buf)
                .map_err(|err| Error::io(format!("read line {}", self.line_number + 1), err))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let mut line = self.buf.as_str();
            line = line.strip_suffix('\n').unwrap_or(line);
            line = line.strip_suffix('\r').unwrap_or(line);
            if self.line_number == 1 {
                line = line.strip_prefix(BYTE_ORDER_MARK).unwrap_or(line);
            }

            match self.format.parse_line(line) {
                Ok(fields) => {
                    self.last_line = self.line_number;
                    return Ok(Some(fields));
                }
                Err(err) if self.ignore_malformed_lines => {
                    self.skipped += 1;
                    warn!(
                        line = self.line_number,
                        column = err.column(),
                        reason = %err,
                        "skipping malformed line"
                    );
                }
                Err(err) => {
                    return Err(Error::Format {
                        line: self.line_number,
                        column: err.column(),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    /// 1-based line number of the most recently returned record.
    pub fn last_line(&self) -> usize {
        self.last_line
    }

    /// Lines dropped under `ignore_malformed_lines`.
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    /// Consume the reader as a lazy iterator that stops after the first error.
    pub fn records(self) -> Records<R> {
        Records {
            reader: self,
            failed: false,
        }
    }
}

pub struct Records<R> {
    reader: RecordReader<R>,
    failed: bool,
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.reader.read_record().transpose();
        if matches!(next, Some(Err(_))) {
            self.failed = true;
        }
        next
    }
}

/// Writes one record per line and flushes after every record, so an
/// interrupted run leaves only complete lines behind.
pub struct RecordWriter<W: Write> {
    writer: W,
    format: RecordFormat,
    label: String,
    written: usize,
}

impl RecordWriter<BufWriter<File>> {
    /// Create or truncate `path`.
    pub fn create(path: &Path, format: RecordFormat) -> Result<Self> {
        let file = File::create(path)
            .map_err(|err| Error::io(format!("create {}", path.display()), err))?;
        let mut writer = Self::new(BufWriter::new(file), format);
        writer.label = path.display().to_string();
        Ok(writer)
    }

    /// Flush and sync file contents to disk.
    pub fn finish(mut self) -> Result<usize> {
        self.flush()?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|err| Error::io(format!("sync {}", self.label), err))?;
        Ok(self.written)
    }
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W, format: RecordFormat) -> Self {
        Self {
            writer,
            format,
            label: "output".to_string(),
            written: 0,
        }
    }

    pub fn write_record<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        let mut line = self.format.format_record(fields);
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .map_err(|err| Error::io(format!("write {}", self.label), err))?;
        self.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|err| Error::io(format!("flush {}", self.label), err))
    }
}
