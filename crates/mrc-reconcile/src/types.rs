use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of a valid record key (lowercase hex digits).
pub const KEY_LEN: usize = 32;

/// `true` if `key` is exactly [`KEY_LEN`] lowercase hex characters.
pub fn is_valid_key(key: &str) -> bool {
    key.len() == KEY_LEN && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Which feed a record came from.
///
/// PRIMARY is authoritative and drives CREATE/UPDATE. SECONDARY is the
/// mirror; a key present only there drives DELETE.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Primary,
    Secondary,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Primary => "primary",
            Source::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tokenized input line, before validation.
///
/// The first token is the key; the remaining tokens are positional fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawLine {
    /// 1-based line number within its source.
    pub line_no: u64,
    pub tokens: Vec<String>,
}

impl RawLine {
    pub fn new(line_no: u64, tokens: Vec<String>) -> Self {
        Self { line_no, tokens }
    }

    /// The key token (empty string for a blank line).
    pub fn key(&self) -> &str {
        self.tokens.first().map(String::as_str).unwrap_or("")
    }
}

/// A validated record. Immutable once read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub fields: BTreeMap<String, String>,
    pub source: Source,
}

impl Record {
    pub fn new(key: impl Into<String>, source: Source) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
            source,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Classification of one merge-join iteration. Never both-absent.
///
/// `Left` is PRIMARY-only, `Right` is SECONDARY-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeStep {
    Left(Record),
    Right(Record),
    /// `(primary, secondary)` sharing one key.
    Both(Record, Record),
}

impl MergeStep {
    pub fn key(&self) -> &str {
        match self {
            MergeStep::Left(r) | MergeStep::Right(r) => &r.key,
            MergeStep::Both(l, _) => &l.key,
        }
    }
}

/// Actionable event kind.
///
/// The serialized names are the downstream consumer's vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "verified")]
    Create,
    #[serde(rename = "primaryEmailChanged")]
    Update,
    #[serde(rename = "delete")]
    Delete,
}

impl EventKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            EventKind::Create => "verified",
            EventKind::Update => "primaryEmailChanged",
            EventKind::Delete => "delete",
        }
    }

    pub fn from_wire_name(s: &str) -> Option<Self> {
        match s {
            "verified" => Some(EventKind::Create),
            "primaryEmailChanged" => Some(EventKind::Update),
            "delete" => Some(EventKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Create => "CREATE",
            EventKind::Update => "UPDATE",
            EventKind::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Actionable output of the policy. Fields are normalized, human-readable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub key: String,
    pub fields: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, record: Record, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            key: record.key,
            fields: record.fields,
            timestamp,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}
