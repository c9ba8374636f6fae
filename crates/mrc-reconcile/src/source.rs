//! Input collaborator contract.
//!
//! A [`RecordSource`] hands out tokenized lines one at a time, in file order,
//! until it is exhausted. It performs no validation; ordering and key format
//! are enforced downstream by the [`LineValidator`](crate::LineValidator).

use std::collections::VecDeque;
use std::fmt;

use crate::RawLine;

/// Failure to read from a source. Always fatal for the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceReadError {
    /// Line number being read when the failure happened, if known.
    pub line_no: Option<u64>,
    pub message: String,
}

impl SourceReadError {
    pub fn new(line_no: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            line_no,
            message: message.into(),
        }
    }
}

impl fmt::Display for SourceReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line_no {
            Some(n) => write!(f, "read failed at line {}: {}", n, self.message),
            None => write!(f, "read failed: {}", self.message),
        }
    }
}

impl std::error::Error for SourceReadError {}

/// Pull-based line supplier for one feed.
pub trait RecordSource: Send {
    /// Next raw line, or `Ok(None)` at end of source.
    fn next_line(&mut self) -> Result<Option<RawLine>, SourceReadError>;
}

impl<T: RecordSource + ?Sized> RecordSource for Box<T> {
    fn next_line(&mut self) -> Result<Option<RawLine>, SourceReadError> {
        (**self).next_line()
    }
}

/// In-memory source, used by fixtures and tests.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    queue: VecDeque<Result<RawLine, SourceReadError>>,
    next_line_no: u64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows of tokens; the first token of each row is the key.
    pub fn from_rows<R, T>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut src = Self::new();
        for row in rows {
            src.push_row(row);
        }
        src
    }

    pub fn push_row<T: Into<String>>(&mut self, tokens: impl IntoIterator<Item = T>) {
        self.next_line_no += 1;
        let tokens = tokens.into_iter().map(Into::into).collect();
        self.queue
            .push_back(Ok(RawLine::new(self.next_line_no, tokens)));
    }

    /// Queue a read failure at the current position.
    pub fn push_failure(&mut self, message: impl Into<String>) {
        self.queue.push_back(Err(SourceReadError::new(
            Some(self.next_line_no + 1),
            message,
        )));
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl RecordSource for MemorySource {
    fn next_line(&mut self) -> Result<Option<RawLine>, SourceReadError> {
        match self.queue.pop_front() {
            None => Ok(None),
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_numbers_lines_and_ends() {
        let mut src = MemorySource::from_rows([vec!["a", "b"], vec!["c"]]);
        let first = src.next_line().unwrap().unwrap();
        assert_eq!(first.line_no, 1);
        assert_eq!(first.tokens, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(src.next_line().unwrap().unwrap().line_no, 2);
        assert!(src.next_line().unwrap().is_none());
        assert!(src.next_line().unwrap().is_none());
    }

    #[test]
    fn queued_failure_is_returned_in_order() {
        let mut src = MemorySource::new();
        src.push_row(["k"]);
        src.push_failure("disk gone");
        assert!(src.next_line().unwrap().is_some());
        let err = src.next_line().unwrap_err();
        assert_eq!(err.line_no, Some(2));
        assert!(err.to_string().contains("disk gone"));
    }
}
