//! Line-level record codec: field splitting, quote wrapping and escaping.
//!
//! A record is one line. In unwrapped mode fields are split on the delimiter
//! verbatim. In wrapped mode every field is enclosed in the quote character
//! and an embedded quote is written twice.

use thiserror::Error;

use crate::core::array::ARRAY_MARKER_PREFIX;

/// Column names of the first record of every backup file.
pub const HEADER: [&str; 4] = ["Index", "RelativePath", "Value", "DataType"];

/// Delimiting and quoting rules shared by the reader and the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFormat {
    pub delimiter: char,
    pub quote: char,
    pub wrap_fields: bool,
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            wrap_fields: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("line cannot be empty")]
    Empty,
    #[error("expected quotation mark at column {column}")]
    ExpectedQuote { column: usize },
    #[error("wrong field delimiter at column {column}")]
    WrongDelimiter { column: usize },
    #[error("unterminated quoted field starting at column {column}")]
    Unterminated { column: usize },
    #[error("expected 4 fields, found {found}")]
    FieldCount { found: usize },
}

impl LineError {
    /// 1-based column the error points at.
    pub fn column(&self) -> usize {
        match self {
            LineError::Empty | LineError::FieldCount { .. } => 1,
            LineError::ExpectedQuote { column }
            | LineError::WrongDelimiter { column }
            | LineError::Unterminated { column } => *column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeField,
    InField,
    AfterClosingQuote,
}

impl RecordFormat {
    pub fn new(delimiter: char, wrap_fields: bool) -> Self {
        Self {
            delimiter,
            wrap_fields,
            ..Self::default()
        }
    }

    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = quote;
        self
    }

    /// Render fields as one line, without the line terminator.
    pub fn format_record<S: AsRef<str>>(&self, fields: &[S]) -> String {
        let mut line = String::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                line.push(self.delimiter);
            }
            if self.wrap_fields {
                line.push(self.quote);
                for c in field.as_ref().chars() {
                    if c == self.quote {
                        line.push(self.quote);
                    }
                    line.push(c);
                }
                line.push(self.quote);
            } else {
                line.push_str(field.as_ref());
            }
        }
        line
    }

    /// True if `field` reads back unchanged under this format.
    pub fn representable(&self, field: &str) -> bool {
        if field.contains(['\n', '\r']) {
            return false;
        }
        self.wrap_fields || !field.contains(self.delimiter)
    }

    /// Split one line (without terminator) into fields.
    pub fn parse_line(&self, line: &str) -> Result<Vec<String>, LineError> {
        if self.wrap_fields {
            self.parse_wrapped(line)
        } else {
            if line.is_empty() {
                return Err(LineError::Empty);
            }
            Ok(line.split(self.delimiter).map(str::to_string).collect())
        }
    }

    fn parse_wrapped(&self, line: &str) -> Result<Vec<String>, LineError> {
        if line.trim().is_empty() {
            return Err(LineError::Empty);
        }

        let mut fields = Vec::new();
        let mut buffer = String::new();
        let mut state = State::BeforeField;
        let mut field_start = 0;
        let mut chars = line.chars().enumerate().peekable();

        while let Some((i, c)) = chars.next() {
            let column = i + 1;
            state = match state {
                State::BeforeField => {
                    if c == self.quote {
                        field_start = column;
                        State::InField
                    } else if c.is_whitespace() {
                        State::BeforeField
                    } else {
                        return Err(LineError::ExpectedQuote { column });
                    }
                }
                State::InField => {
                    if c != self.quote {
                        buffer.push(c);
                        State::InField
                    } else if chars.peek().is_some_and(|&(_, next)| next == self.quote) {
                        chars.next();
                        buffer.push(self.quote);
                        State::InField
                    } else {
                        fields.push(std::mem::take(&mut buffer));
                        State::AfterClosingQuote
                    }
                }
                State::AfterClosingQuote => {
                    // Delimiter first: a tab delimiter is also whitespace.
                    if c == self.delimiter {
                        State::BeforeField
                    } else if c.is_whitespace() {
                        State::AfterClosingQuote
                    } else {
                        return Err(LineError::WrongDelimiter { column });
                    }
                }
            };
        }

        match state {
            State::AfterClosingQuote => Ok(fields),
            State::InField => Err(LineError::Unterminated {
                column: field_start,
            }),
            State::BeforeField => Err(LineError::ExpectedQuote {
                column: line.chars().count() + 1,
            }),
        }
    }
}

/// What a data line describes, decided by its `Index` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Scalar,
    ArrayMarker,
    Unknown,
}

/// One `Index,RelativePath,Value,DataType` row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub index: String,
    pub relative_path: String,
    pub value: String,
    pub data_type: String,
}

impl Record {
    pub fn new(
        index: impl Into<String>,
        relative_path: impl Into<String>,
        value: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            index: index.into(),
            relative_path: relative_path.into(),
            value: value.into(),
            data_type: data_type.into(),
        }
    }

    pub fn header() -> Self {
        let [index, path, value, data_type] = HEADER;
        Self::new(index, path, value, data_type)
    }

    pub fn from_fields(fields: Vec<String>) -> Result<Self, LineError> {
        let found = fields.len();
        let Ok([index, relative_path, value, data_type]) = <[String; 4]>::try_from(fields) else {
            return Err(LineError::FieldCount { found });
        };
        Ok(Self {
            index,
            relative_path,
            value,
            data_type,
        })
    }

    pub fn fields(&self) -> [&str; 4] {
        [
            &self.index,
            &self.relative_path,
            &self.value,
            &self.data_type,
        ]
    }

    pub fn kind(&self) -> RecordKind {
        if self.index.is_empty() {
            RecordKind::Scalar
        } else if self.index.starts_with(ARRAY_MARKER_PREFIX) {
            RecordKind::ArrayMarker
        } else {
            RecordKind::Unknown
        }
    }
}
