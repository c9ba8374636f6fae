//! Per-source key ordering watermark
//!
//! # Purpose
//!
//! The merge join is only correct when each feed arrives strictly sorted.
//! This module tracks the **last accepted key** of one source and classifies
//! every new key against it.
//!
//! # Invariants
//!
//! - **Strictly increasing**: a key is accepted only if it is > the last
//!   accepted key (byte-wise lexicographic).
//! - **Duplicates are violations**: a key equal to the watermark is rejected.
//! - **Watermark advances only on acceptance**: violations do not move it.
//! - **Pure, no IO**: the caller decides what a violation means for the run.

use std::cmp::Ordering;

// ---------------------------------------------------------------------------
// Order decision
// ---------------------------------------------------------------------------

/// Result of checking a key against the watermark.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyOrder {
    /// Key is strictly greater than the watermark (or the watermark is empty).
    Ascending,

    /// Key equals the last accepted key.
    Duplicate { key: String },

    /// Key sorts before the last accepted key.
    Regressed { watermark: String, got: String },
}

impl KeyOrder {
    pub fn is_ascending(&self) -> bool {
        matches!(self, KeyOrder::Ascending)
    }
}

// ---------------------------------------------------------------------------
// Watermark
// ---------------------------------------------------------------------------

/// Tracks the last accepted key of one source.
///
/// Call [`accept`][KeyWatermark::accept] on each validated key and only pass
/// the record on if the result is [`KeyOrder::Ascending`]. Use
/// [`check`][KeyWatermark::check] for a read-only check.
#[derive(Clone, Debug, Default)]
pub struct KeyWatermark {
    last_accepted: Option<String>,
}

impl KeyWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `key` without advancing the watermark.
    pub fn check(&self, key: &str) -> KeyOrder {
        let Some(last) = self.last_accepted.as_deref() else {
            return KeyOrder::Ascending;
        };
        match key.cmp(last) {
            Ordering::Greater => KeyOrder::Ascending,
            Ordering::Equal => KeyOrder::Duplicate {
                key: key.to_string(),
            },
            Ordering::Less => KeyOrder::Regressed {
                watermark: last.to_string(),
                got: key.to_string(),
            },
        }
    }

    /// Classify `key` and advance the watermark if it is ascending.
    pub fn accept(&mut self, key: &str) -> KeyOrder {
        let result = self.check(key);
        if result.is_ascending() {
            self.last_accepted = Some(key.to_string());
        }
        result
    }

    /// Last accepted key, `None` before the first acceptance.
    pub fn last_accepted(&self) -> Option<&str> {
        self.last_accepted.as_deref()
    }

    pub fn has_accepted_any(&self) -> bool {
        self.last_accepted.is_some()
    }
}
