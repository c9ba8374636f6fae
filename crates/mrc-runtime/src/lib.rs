//! mrc-runtime
//!
//! Run coordination: wires the merge join, the policy, the bucket statistics
//! and the delivery pipeline into one run with a single outcome.
//!
//! ```text
//! INIT ──► RUNNING ──► COMPLETED
//!              │
//!              └─────► FATAL
//! ```
//!
//! Reading happens on a blocking worker that feeds a bounded channel; the
//! async control loop owns [`RunCounts`], the histogram and the pipeline, so
//! every counter is mutated in one place.
//!
//! [`run_maintenance`] reuses the join for mirror maintenance: no delivery,
//! only a rewritten mirror on a writer.

mod coordinator;
mod counts;
mod maintenance;
mod reporter;

pub use coordinator::{RunCoordinator, RunOptions, RunOutcome, RunPhase};
pub use counts::RunCounts;
pub use maintenance::{run_maintenance, MaintenanceOutcome, MirrorLayout};
pub use reporter::{RecoverableError, RunReporter, TracingReporter};
