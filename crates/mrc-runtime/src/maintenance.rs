//! Mirror maintenance run: change feed + mirror in, new mirror rows out.
//!
//! Synchronous and single-threaded; nothing is delivered. Rows are written in
//! key order as the join produces them, so the output stays sorted.

use std::io::{self, Write};

use mrc_ingest::format_row;
use mrc_reconcile::{FatalError, MaintenanceCounts, MergeJoin, MirrorPolicy, RecordSource};

use crate::{RecoverableError, RunReporter};

#[derive(Clone, Debug, PartialEq)]
pub enum MaintenanceOutcome {
    Completed(MaintenanceCounts),
    /// Rows up to the abort have been written.
    Fatal {
        error: FatalError,
        counts: MaintenanceCounts,
    },
}

impl MaintenanceOutcome {
    pub fn counts(&self) -> &MaintenanceCounts {
        match self {
            MaintenanceOutcome::Completed(c) | MaintenanceOutcome::Fatal { counts: c, .. } => c,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, MaintenanceOutcome::Fatal { .. })
    }

    pub fn exit_code(&self) -> i32 {
        i32::from(self.is_fatal())
    }
}

/// Layout of the rows written back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorLayout {
    pub columns: Vec<String>,
    pub separator: char,
}

/// Run `policy` over `join` and write surviving mirror rows to `out`.
///
/// I/O errors on `out` are returned as-is; input problems end up in the
/// outcome.
pub fn run_maintenance<P, S, W, R>(
    mut join: MergeJoin<P, S>,
    policy: &MirrorPolicy,
    layout: &MirrorLayout,
    out: &mut W,
    reporter: &mut R,
    progress_interval: u64,
) -> io::Result<MaintenanceOutcome>
where
    P: RecordSource,
    S: RecordSource,
    W: Write,
    R: RunReporter,
{
    let mut counts = MaintenanceCounts::default();
    let mut steps = 0u64;

    let result = loop {
        let next = join.next_step();
        for r in join.drain_rejections() {
            counts.error += 1;
            reporter.recoverable_error(&RecoverableError::from(r));
        }
        let step = match next {
            Ok(Some(step)) => step,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };

        let decision = policy.decide(step);
        counts.apply(&decision);
        if let Some(row) = &decision.row {
            writeln!(out, "{}", format_row(row, &layout.columns, layout.separator))?;
        }

        steps += 1;
        if progress_interval > 0 && steps % progress_interval == 0 {
            reporter.progress(steps);
        }
    };
    out.flush()?;

    match result {
        Ok(()) => {
            tracing::info!(
                policy = policy.name(),
                deleted = counts.deleted,
                not_deleted = counts.not_deleted,
                updated = counts.updated,
                already_equal = counts.already_equal,
                mirror_only = counts.mirror_only,
                not_in_mirror = counts.not_in_mirror,
                error = counts.error,
                total_mirror = counts.total_mirror(),
                total_feed = counts.total_feed(),
                "maintenance completed"
            );
            Ok(MaintenanceOutcome::Completed(counts))
        }
        Err(error) => {
            reporter.fatal_error(&error);
            Ok(MaintenanceOutcome::Fatal { error, counts })
        }
    }
}
