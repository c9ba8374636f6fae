//! Reporting contract between a run and its caller.

use std::fmt;

use mrc_delivery::QueueMessage;
use mrc_reconcile::{FatalError, Rejection};

use crate::RunCounts;

/// A skipped input line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoverableError {
    /// Input the line came from (`primary`, `secondary`, `replay`, `diff`).
    pub source: String,
    pub key: String,
    pub line_no: u64,
    pub message: String,
}

impl From<Rejection> for RecoverableError {
    fn from(r: Rejection) -> Self {
        Self {
            source: r.source.as_str().to_string(),
            message: "invalid key; line discarded".to_string(),
            key: r.raw_key,
            line_no: r.line_no,
        }
    }
}

impl fmt::Display for RecoverableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} line {} ({:?}): {}",
            self.source, self.line_no, self.key, self.message
        )
    }
}

/// Run signals. All methods default to no-ops.
pub trait RunReporter: Send {
    fn progress(&mut self, _read_units: u64) {}

    fn recoverable_error(&mut self, _error: &RecoverableError) {}

    fn fatal_error(&mut self, _error: &FatalError) {}

    fn sent(&mut self, _message: &QueueMessage) {}

    fn write_error(&mut self, _message: &QueueMessage, _reason: &str) {}

    fn completed(&mut self, _counts: &RunCounts) {}
}

/// Logs every signal through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl RunReporter for TracingReporter {
    fn progress(&mut self, read_units: u64) {
        tracing::info!(read_units, "progress");
    }

    fn recoverable_error(&mut self, error: &RecoverableError) {
        tracing::warn!(
            source = %error.source,
            key = %error.key,
            line_no = error.line_no,
            "{}",
            error.message
        );
    }

    fn fatal_error(&mut self, error: &FatalError) {
        tracing::error!(source = error.input_name(), key = error.key(), "{}", error);
    }

    fn sent(&mut self, message: &QueueMessage) {
        tracing::debug!(id = %message.id, key = %message.event.key, kind = %message.event.kind, "sent");
    }

    fn write_error(&mut self, message: &QueueMessage, reason: &str) {
        tracing::warn!(id = %message.id, key = %message.event.key, kind = %message.event.kind, reason, "write-error");
    }

    fn completed(&mut self, counts: &RunCounts) {
        tracing::info!(
            create = counts.create,
            update = counts.update,
            delete = counts.delete,
            ignore = counts.ignore,
            error = counts.error,
            sent = counts.sent,
            write_error = counts.write_error,
            stats = %counts.stats,
            "completed"
        );
    }
}
