//! Reconciliation policy: merge step → decision.
//!
//! | step    | decision                                              |
//! |---------|-------------------------------------------------------|
//! | `Left`  | CREATE with PRIMARY fields                            |
//! | `Right` | DELETE with SECONDARY fields                          |
//! | `Both`  | UPDATE with PRIMARY fields if identities differ, else IGNORE |
//!
//! Identity comparison is case-insensitive on normalized values. Events carry
//! normalized values with their original case.

use std::collections::BTreeSet;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};

use crate::{Event, EventKind, MergeStep, Record};

// ---------------------------------------------------------------------------
// Field normalization
// ---------------------------------------------------------------------------

/// Per-source field normalization: optional base64 transport decoding, then
/// trimming.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldNormalizer {
    base64_fields: BTreeSet<String>,
}

impl FieldNormalizer {
    /// Trim only.
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn with_base64_fields<T: Into<String>>(fields: impl IntoIterator<Item = T>) -> Self {
        Self {
            base64_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn normalize_value(&self, name: &str, raw: &str) -> String {
        let trimmed = raw.trim();
        if !self.base64_fields.contains(name) || trimmed.is_empty() {
            return trimmed.to_string();
        }
        match decode_base64(trimmed) {
            Some(decoded) => decoded.trim().to_string(),
            None => {
                tracing::warn!(field = name, "value is not valid base64; keeping raw value");
                trimmed.to_string()
            }
        }
    }

    pub fn normalize(&self, mut record: Record) -> Record {
        for (name, value) in record.fields.iter_mut() {
            *value = self.normalize_value(name, value);
        }
        record
    }
}

fn decode_base64(s: &str) -> Option<String> {
    let bytes = general_purpose::STANDARD.decode(s).ok()?;
    String::from_utf8(bytes).ok()
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Emit(Event),
    /// Matching key with equal identity. Counted, never delivered.
    Ignore { key: String },
}

impl Decision {
    pub fn is_ignore(&self) -> bool {
        matches!(self, Decision::Ignore { .. })
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            Decision::Emit(e) => Some(e),
            Decision::Ignore { .. } => None,
        }
    }

    pub fn into_event(self) -> Option<Event> {
        match self {
            Decision::Emit(e) => Some(e),
            Decision::Ignore { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Stateless decision rules for one run.
#[derive(Clone, Debug)]
pub struct ReconcilePolicy {
    primary: FieldNormalizer,
    secondary: FieldNormalizer,
    identity_field: String,
    timestamp: DateTime<Utc>,
}

impl ReconcilePolicy {
    /// Plain normalization on both sides, identity field `email`.
    /// Every emitted event is stamped with `timestamp`.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            primary: FieldNormalizer::plain(),
            secondary: FieldNormalizer::plain(),
            identity_field: "email".to_string(),
            timestamp,
        }
    }

    pub fn with_primary_normalizer(mut self, n: FieldNormalizer) -> Self {
        self.primary = n;
        self
    }

    pub fn with_secondary_normalizer(mut self, n: FieldNormalizer) -> Self {
        self.secondary = n;
        self
    }

    pub fn with_identity_field(mut self, name: impl Into<String>) -> Self {
        self.identity_field = name.into();
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn decide(&self, step: MergeStep) -> Decision {
        match step {
            MergeStep::Left(p) => self.emit(EventKind::Create, self.primary.normalize(p)),
            MergeStep::Right(s) => self.emit(EventKind::Delete, self.secondary.normalize(s)),
            MergeStep::Both(p, s) => {
                let p = self.primary.normalize(p);
                let s = self.secondary.normalize(s);
                let same = identities_match(
                    p.field(&self.identity_field),
                    s.field(&self.identity_field),
                );
                if same {
                    Decision::Ignore { key: p.key }
                } else {
                    self.emit(EventKind::Update, p)
                }
            }
        }
    }

    fn emit(&self, kind: EventKind, record: Record) -> Decision {
        Decision::Emit(Event::new(kind, record, self.timestamp))
    }
}

fn identities_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        (None, None) => true,
        _ => false,
    }
}
