//! mrc-ingest
//!
//! Input collaborators for the reconciliation core:
//!
//! - [`DelimitedLineReader`]: one pre-sorted feed, one record per line,
//!   tokens split on a single separator character. Implements
//!   [`mrc_reconcile::RecordSource`].
//! - [`EventLineReader`] / [`write_event_line`]: the JSON-lines event format
//!   used for stdout output and for replaying a previous run's events.
//! - [`DiffEventReader`]: events derived from a unified diff of two sorted
//!   `uid,email` exports.
//! - [`format_row`]: the inverse of [`split_line`], for rewritten mirror rows.
//!
//! No quoting or escaping rules are applied to delimited input.

mod delimited;
mod diff;
mod events;

pub use delimited::{format_row, split_line, DelimitedLineReader, IngestError};
pub use diff::DiffEventReader;
pub use events::{event_to_json, write_event_line, EventLineReader, EventLineError};
