//! Mirror maintenance: rewrite the SECONDARY mirror from a change feed.
//!
//! The change feed is joined as PRIMARY, the mirror as SECONDARY. Each merge
//! step yields an outcome and, optionally, the mirror row to write back.
//!
//! | policy          | step    | outcome        | row written            |
//! |-----------------|---------|----------------|------------------------|
//! | `RemoveDeleted` | `Left`  | `NotInMirror`  | no                     |
//! | `RemoveDeleted` | `Right` | `NotDeleted`   | mirror row             |
//! | `RemoveDeleted` | `Both`  | `Deleted`      | no                     |
//! | `UpdateEmails`  | `Left`  | `NotInMirror`  | no                     |
//! | `UpdateEmails`  | `Right` | `MirrorOnly`   | mirror row             |
//! | `UpdateEmails`  | `Both`  | `Updated`      | mirror row, new email  |
//! | `UpdateEmails`  | `Both`  | `AlreadyEqual` | no                     |
//!
//! Email comparison is exact after trimming.

use serde::Serialize;

use crate::{MergeStep, Record};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MirrorPolicy {
    /// The feed lists deleted keys; matching mirror rows are dropped.
    RemoveDeleted,
    /// The feed carries new values of `field`; matching mirror rows are rewritten.
    UpdateEmails { field: String },
}

impl MirrorPolicy {
    pub fn update_emails() -> Self {
        MirrorPolicy::UpdateEmails {
            field: "email".to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MirrorPolicy::RemoveDeleted => "remove-deleted",
            MirrorPolicy::UpdateEmails { .. } => "update-emails",
        }
    }

    pub fn decide(&self, step: MergeStep) -> MirrorDecision {
        match (self, step) {
            (_, MergeStep::Left(feed)) => MirrorDecision::skip(MirrorOutcome::NotInMirror, feed.key),
            (MirrorPolicy::RemoveDeleted, MergeStep::Right(mirror)) => {
                MirrorDecision::keep(MirrorOutcome::NotDeleted, mirror)
            }
            (MirrorPolicy::RemoveDeleted, MergeStep::Both(feed, _)) => {
                MirrorDecision::skip(MirrorOutcome::Deleted, feed.key)
            }
            (MirrorPolicy::UpdateEmails { .. }, MergeStep::Right(mirror)) => {
                MirrorDecision::keep(MirrorOutcome::MirrorOnly, mirror)
            }
            (MirrorPolicy::UpdateEmails { field }, MergeStep::Both(feed, mut mirror)) => {
                let new = feed.field(field).map(str::trim).unwrap_or("");
                let old = mirror.field(field).map(str::trim).unwrap_or("");
                if new == old {
                    return MirrorDecision::skip(MirrorOutcome::AlreadyEqual, feed.key);
                }
                mirror.fields.insert(field.clone(), new.to_string());
                MirrorDecision::keep(MirrorOutcome::Updated, mirror)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MirrorOutcome {
    Deleted,
    NotDeleted,
    NotInMirror,
    Updated,
    AlreadyEqual,
    MirrorOnly,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorDecision {
    pub key: String,
    pub outcome: MirrorOutcome,
    /// Row to write to the new mirror, if any.
    pub row: Option<Record>,
}

impl MirrorDecision {
    fn skip(outcome: MirrorOutcome, key: String) -> Self {
        Self {
            key,
            outcome,
            row: None,
        }
    }

    fn keep(outcome: MirrorOutcome, row: Record) -> Self {
        Self {
            key: row.key.clone(),
            outcome,
            row: Some(row),
        }
    }
}

/// Per-outcome tallies for one maintenance run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceCounts {
    pub deleted: u64,
    pub not_deleted: u64,
    pub updated: u64,
    pub already_equal: u64,
    pub mirror_only: u64,
    pub not_in_mirror: u64,
    /// Rejected lines on either input.
    pub error: u64,
    /// Rows written to the new mirror.
    pub written: u64,
}

impl MaintenanceCounts {
    pub fn apply(&mut self, decision: &MirrorDecision) {
        match decision.outcome {
            MirrorOutcome::Deleted => self.deleted += 1,
            MirrorOutcome::NotDeleted => self.not_deleted += 1,
            MirrorOutcome::NotInMirror => self.not_in_mirror += 1,
            MirrorOutcome::Updated => self.updated += 1,
            MirrorOutcome::AlreadyEqual => self.already_equal += 1,
            MirrorOutcome::MirrorOnly => self.mirror_only += 1,
        }
        if decision.row.is_some() {
            self.written += 1;
        }
    }

    /// Valid mirror rows seen.
    pub fn total_mirror(&self) -> u64 {
        self.deleted + self.not_deleted + self.updated + self.already_equal + self.mirror_only
    }

    /// Valid feed rows seen.
    pub fn total_feed(&self) -> u64 {
        self.deleted + self.updated + self.already_equal + self.not_in_mirror
    }
}
