//! Line validation for one source.
//!
//! `validate(raw)` turns a [`RawLine`] into a [`Record`] or classifies it:
//!
//! - bad key format → [`Validation::Rejected`] (recoverable; skip the line)
//! - key ≤ previous accepted key → [`Validation::Fatal`] (abort the run)
//!
//! Field values are mapped to column names but otherwise untouched;
//! normalization belongs to the policy.

use std::fmt;

use crate::watermark::{KeyOrder, KeyWatermark};
use crate::{is_valid_key, RawLine, Record, Source};

/// A line dropped for a malformed key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub source: Source,
    pub raw_key: String,
    pub line_no: u64,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid key on {} line {}: {:?}",
            self.source, self.line_no, self.raw_key
        )
    }
}

impl std::error::Error for Rejection {}

/// A well-formed key that breaks strict ascending order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderViolation {
    pub source: Source,
    pub key: String,
    /// Last accepted key on the same source.
    pub previous: String,
    pub line_no: u64,
}

impl fmt::Display for OrderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = if self.key == self.previous {
            "duplicate key"
        } else {
            "out-of-order key"
        };
        write!(
            f,
            "{} on {} line {}: {} (previous {})",
            what, self.source, self.line_no, self.key, self.previous
        )
    }
}

impl std::error::Error for OrderViolation {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validation {
    Accepted(Record),
    Rejected(Rejection),
    Fatal(OrderViolation),
}

impl Validation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Validation::Accepted(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Validation::Fatal(_))
    }
}

/// Validator bound to one source and its column layout.
///
/// `columns[0]` names the key column; `columns[1..]` name the positional
/// fields that follow it. Extra tokens beyond the layout are ignored; missing
/// trailing tokens are simply absent from the record.
#[derive(Clone, Debug)]
pub struct LineValidator {
    source: Source,
    columns: Vec<String>,
    watermark: KeyWatermark,
    accepted: u64,
    rejected: u64,
}

impl LineValidator {
    pub fn new<T: Into<String>>(source: Source, columns: impl IntoIterator<Item = T>) -> Self {
        Self {
            source,
            columns: columns.into_iter().map(Into::into).collect(),
            watermark: KeyWatermark::new(),
            accepted: 0,
            rejected: 0,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn validate(&mut self, raw: RawLine) -> Validation {
        let key = raw.key();
        if !is_valid_key(key) {
            self.rejected += 1;
            return Validation::Rejected(Rejection {
                source: self.source,
                raw_key: key.to_string(),
                line_no: raw.line_no,
            });
        }

        match self.watermark.accept(key) {
            KeyOrder::Ascending => {}
            KeyOrder::Duplicate { key } => {
                return Validation::Fatal(OrderViolation {
                    source: self.source,
                    previous: key.clone(),
                    key,
                    line_no: raw.line_no,
                });
            }
            KeyOrder::Regressed { watermark, got } => {
                return Validation::Fatal(OrderViolation {
                    source: self.source,
                    key: got,
                    previous: watermark,
                    line_no: raw.line_no,
                });
            }
        }

        self.accepted += 1;
        let mut tokens = raw.tokens.into_iter();
        let mut record = Record::new(tokens.next().unwrap_or_default(), self.source);
        for (name, value) in self.columns.iter().skip(1).zip(tokens) {
            record.fields.insert(name.clone(), value);
        }
        Validation::Accepted(record)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn last_accepted_key(&self) -> Option<&str> {
        self.watermark.last_accepted()
    }
}
