//! Merge-join over two validated, strictly ascending feeds.
//!
//! # Invariants
//!
//! - **One step per call**: `next()` yields exactly one [`MergeStep`] or
//!   `Done` (`Ok(None)`).
//! - **Exhausted sorts last**: an exhausted source behaves as a key greater
//!   than any real key, so the other side drains as single-sided steps.
//! - **Lazy reads**: a cursor is refilled only when the next call needs it.
//!   A fatal line is therefore detected before any step past it is emitted.
//! - **Halt is sticky**: after a fatal error every later call returns `Done`.
//! - **Bounded memory**: one current record per source plus the queue of
//!   rejections not yet drained.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::mem;

use crate::source::{RecordSource, SourceReadError};
use crate::validator::{LineValidator, OrderViolation, Rejection, Validation};
use crate::{MergeStep, Record, Source};

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

/// Conditions that abort a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FatalError {
    /// Duplicate or out-of-order key on one source.
    OutOfOrder(OrderViolation),

    /// The source could not be read.
    Read {
        source: Source,
        error: SourceReadError,
    },

    /// A pre-decided event stream (replay or diff input) could not be read
    /// or is structurally broken.
    EventInput(SourceReadError),

    /// The reading side went away without reporting the end of its input.
    ReaderStopped,
}

impl FatalError {
    /// Feed the fatal condition was observed on. `None` when it was not one
    /// of the two merge feeds.
    pub fn feed(&self) -> Option<Source> {
        match self {
            FatalError::OutOfOrder(v) => Some(v.source),
            FatalError::Read { source, .. } => Some(*source),
            FatalError::EventInput(_) | FatalError::ReaderStopped => None,
        }
    }

    /// Name of the failing input, for logs.
    pub fn input_name(&self) -> &'static str {
        match self {
            FatalError::EventInput(_) => "events",
            FatalError::ReaderStopped => "reader",
            other => other.feed().map(|s| s.as_str()).unwrap_or("reader"),
        }
    }

    /// Offending key (empty unless the key order broke).
    pub fn key(&self) -> &str {
        match self {
            FatalError::OutOfOrder(v) => &v.key,
            _ => "",
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::OutOfOrder(v) => write!(f, "incorrectly sorted input: {}", v),
            FatalError::Read { source, error } => write!(f, "{} source: {}", source, error),
            FatalError::EventInput(error) => write!(f, "event input: {}", error),
            FatalError::ReaderStopped => f.write_str("reader stopped before end of input"),
        }
    }
}

impl std::error::Error for FatalError {}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Cursor {
    /// Needs a read before it can be compared.
    Empty,
    Ready(Record),
    Exhausted,
}

struct Side<R> {
    reader: R,
    validator: LineValidator,
    cursor: Cursor,
}

impl<R: RecordSource> Side<R> {
    fn fill(&mut self, rejections: &mut VecDeque<Rejection>) -> Result<(), FatalError> {
        if !matches!(self.cursor, Cursor::Empty) {
            return Ok(());
        }
        loop {
            let raw = match self.reader.next_line() {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    self.cursor = Cursor::Exhausted;
                    return Ok(());
                }
                Err(error) => {
                    return Err(FatalError::Read {
                        source: self.validator.source(),
                        error,
                    })
                }
            };
            match self.validator.validate(raw) {
                Validation::Accepted(record) => {
                    self.cursor = Cursor::Ready(record);
                    return Ok(());
                }
                Validation::Rejected(r) => rejections.push_back(r),
                Validation::Fatal(v) => return Err(FatalError::OutOfOrder(v)),
            }
        }
    }

    fn key(&self) -> Option<&str> {
        match &self.cursor {
            Cursor::Ready(r) => Some(&r.key),
            _ => None,
        }
    }

    fn take(&mut self) -> Option<Record> {
        match mem::replace(&mut self.cursor, Cursor::Empty) {
            Cursor::Ready(r) => Some(r),
            other => {
                self.cursor = other;
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MergeJoin
// ---------------------------------------------------------------------------

/// Two-pointer merge join. `P` feeds PRIMARY, `S` feeds SECONDARY.
///
/// Malformed lines encountered while advancing are queued; drain them with
/// [`drain_rejections`][MergeJoin::drain_rejections] after each call.
pub struct MergeJoin<P, S> {
    primary: Side<P>,
    secondary: Side<S>,
    rejections: VecDeque<Rejection>,
    steps: u64,
    halted: bool,
}

impl<P: RecordSource, S: RecordSource> MergeJoin<P, S> {
    pub fn new(
        primary: P,
        primary_validator: LineValidator,
        secondary: S,
        secondary_validator: LineValidator,
    ) -> Self {
        Self {
            primary: Side {
                reader: primary,
                validator: primary_validator,
                cursor: Cursor::Empty,
            },
            secondary: Side {
                reader: secondary,
                validator: secondary_validator,
                cursor: Cursor::Empty,
            },
            rejections: VecDeque::new(),
            steps: 0,
            halted: false,
        }
    }

    /// Advance one logical step. `Ok(None)` is `Done`.
    pub fn next_step(&mut self) -> Result<Option<MergeStep>, FatalError> {
        if self.halted {
            return Ok(None);
        }

        let filled = self
            .primary
            .fill(&mut self.rejections)
            .and_then(|_| self.secondary.fill(&mut self.rejections));
        if let Err(e) = filled {
            self.halted = true;
            return Err(e);
        }

        let order = match (self.primary.key(), self.secondary.key()) {
            (None, None) => return Ok(None),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(p), Some(s)) => p.cmp(s),
        };

        let step = match order {
            Ordering::Less => self.primary.take().map(MergeStep::Left),
            Ordering::Greater => self.secondary.take().map(MergeStep::Right),
            Ordering::Equal => match (self.primary.take(), self.secondary.take()) {
                (Some(p), Some(s)) => Some(MergeStep::Both(p, s)),
                _ => None,
            },
        };
        if step.is_some() {
            self.steps += 1;
        }
        Ok(step)
    }

    pub fn drain_rejections(&mut self) -> impl Iterator<Item = Rejection> + '_ {
        self.rejections.drain(..)
    }

    /// Merge steps produced so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn primary_records(&self) -> u64 {
        self.primary.validator.accepted()
    }

    pub fn secondary_records(&self) -> u64 {
        self.secondary.validator.accepted()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }
}

impl<P: RecordSource, S: RecordSource> Iterator for MergeJoin<P, S> {
    type Item = Result<MergeStep, FatalError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_step().transpose()
    }
}
