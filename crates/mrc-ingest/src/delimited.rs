//! Delimited line reader for one sorted feed.
//!
//! ## Line contract
//!
//! | Position | Meaning                                  |
//! |----------|------------------------------------------|
//! | 0        | record key                               |
//! | 1..      | positional fields, named by the layout   |
//!
//! Each token is trimmed. A trailing `\r` is stripped. Blank lines are
//! passed through (as a line with an empty key) so the validator can report
//! them.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use mrc_reconcile::{RawLine, Record, RecordSource, SourceReadError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum IngestError {
    /// The input could not be opened.
    Open { path: String, message: String },
    /// A line could not be read (I/O failure or invalid UTF-8).
    Read { line_no: u64, message: String },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Open { path, message } => write!(f, "open '{path}': {message}"),
            IngestError::Read { line_no, message } => {
                write!(f, "read line {line_no}: {message}")
            }
        }
    }
}

impl std::error::Error for IngestError {}

impl From<IngestError> for SourceReadError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Open { path, message } => {
                SourceReadError::new(None, format!("open '{path}': {message}"))
            }
            IngestError::Read { line_no, message } => SourceReadError::new(Some(line_no), message),
        }
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Split one line on `separator`, trimming every token.
pub fn split_line(line: &str, separator: char) -> Vec<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Vec::new();
    }
    line.split(separator).map(|t| t.trim().to_string()).collect()
}

/// Render a record back into one delimited line, fields in `columns` order.
/// `columns[0]` is the key column; absent fields are written empty.
pub fn format_row(record: &Record, columns: &[String], separator: char) -> String {
    let mut row = record.key.clone();
    for name in columns.iter().skip(1) {
        row.push(separator);
        row.push_str(record.field(name).unwrap_or(""));
    }
    row
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Streams [`RawLine`]s from any buffered reader, one line per call.
pub struct DelimitedLineReader<R> {
    inner: R,
    separator: char,
    line_no: u64,
    buf: String,
}

impl DelimitedLineReader<BufReader<File>> {
    pub fn open(path: &Path, separator: char) -> Result<Self, IngestError> {
        let file = File::open(path).map_err(|e| IngestError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "feed opened");
        Ok(Self::new(BufReader::new(file), separator))
    }
}

impl<R: BufRead> DelimitedLineReader<R> {
    pub fn new(inner: R, separator: char) -> Self {
        Self {
            inner,
            separator,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// Lines read so far.
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }

    pub fn read_line(&mut self) -> Result<Option<RawLine>, IngestError> {
        self.buf.clear();
        let n = self
            .inner
            .read_line(&mut self.buf)
            .map_err(|e| IngestError::Read {
                line_no: self.line_no + 1,
                message: e.to_string(),
            })?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        Ok(Some(RawLine::new(
            self.line_no,
            split_line(&self.buf, self.separator),
        )))
    }
}

impl<R: BufRead + Send> RecordSource for DelimitedLineReader<R> {
    fn next_line(&mut self) -> Result<Option<RawLine>, SourceReadError> {
        self.read_line().map_err(Into::into)
    }
}
