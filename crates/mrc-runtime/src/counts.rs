use mrc_delivery::DeliveryOutcome;
use mrc_reconcile::{BucketStats, Decision, EventKind};
use serde::Serialize;

/// Per-run tallies.
///
/// Decision counters (`create`, `update`, `delete`, `ignore`) plus `error`
/// account for every read unit exactly once: `total() == read_units`.
/// Delivery counters (`sent`, `write_error`, `abandoned`) account for every
/// actionable event that reached the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunCounts {
    pub create: u64,
    pub update: u64,
    pub delete: u64,
    pub ignore: u64,
    /// Lines skipped as malformed.
    pub error: u64,

    pub sent: u64,
    pub write_error: u64,
    /// Events accepted by the pipeline but never dispatched (fatal abort).
    pub abandoned: u64,

    /// Merge steps plus skipped lines.
    pub read_units: u64,
    pub primary_records: u64,
    pub secondary_records: u64,

    pub stats: BucketStats,
}

impl RunCounts {
    pub fn actionable(&self) -> u64 {
        self.create + self.update + self.delete
    }

    pub fn total(&self) -> u64 {
        self.actionable() + self.ignore + self.error
    }

    pub fn apply_kind(&mut self, kind: EventKind) {
        match kind {
            EventKind::Create => self.create += 1,
            EventKind::Update => self.update += 1,
            EventKind::Delete => self.delete += 1,
        }
    }

    pub fn apply_decision(&mut self, decision: &Decision) {
        match decision {
            Decision::Emit(e) => self.apply_kind(e.kind),
            Decision::Ignore { .. } => self.ignore += 1,
        }
    }

    pub fn apply_outcome(&mut self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Sent { .. } => self.sent += 1,
            DeliveryOutcome::WriteError { .. } => self.write_error += 1,
        }
    }

    /// Every actionable event is sent, failed or abandoned.
    pub fn deliveries_resolved(&self) -> bool {
        self.sent + self.write_error + self.abandoned == self.actionable()
    }
}
