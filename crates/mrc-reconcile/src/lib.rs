//! mrc-reconcile
//!
//! Sorted-stream reconciliation core.
//!
//! Two pre-sorted feeds (PRIMARY, the source of truth, and SECONDARY, its
//! mirror) are pulled in lock-step and classified one merge step at a time:
//!
//! ```text
//! RecordSource -> LineValidator -> MergeJoin -> ReconcilePolicy -> Event
//!                                                      \-> BucketHistogram
//! ```
//!
//! Architectural decisions:
//! - Keys are 32 lowercase hex characters; anything else is skipped, not fatal
//! - Per-source keys are strictly ascending; a repeat or regression halts the run
//! - Exactly one decision per merge step
//! - Inputs are never materialized; memory is constant per step
//!
//! The same join also drives mirror maintenance ([`MirrorPolicy`]): a change
//! feed against the mirror, producing the rows of a new mirror.
//!
//! Deterministic, pure logic. No network, no clocks. Reading is delegated to
//! the [`RecordSource`] collaborator.

mod engine;
mod maintenance;
mod policy;
mod source;
mod stats;
mod types;
mod validator;
mod watermark;

pub use engine::{FatalError, MergeJoin};
pub use maintenance::{MaintenanceCounts, MirrorDecision, MirrorOutcome, MirrorPolicy};
pub use policy::{Decision, FieldNormalizer, ReconcilePolicy};
pub use source::{MemorySource, RecordSource, SourceReadError};
pub use stats::{BucketHistogram, BucketStats, NIBBLES};
pub use types::*;
pub use validator::{LineValidator, OrderViolation, Rejection, Validation};
pub use watermark::{KeyOrder, KeyWatermark};
