//! Layered YAML configuration.
//!
//! Documents are merged in order (later layers override earlier ones),
//! checked for secret-looking literals, canonicalized to JSON and hashed.
//! The hash is logged at run start so two runs can be compared by config.
//!
//! Typed access goes through [`SyncSettings`]; secrets are resolved from
//! environment variables named in the config via [`secrets::resolve_secrets`].

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

pub mod secrets;
mod settings;

pub use settings::{
    DeliverySettings, DryRunSettings, FeedLayout, QueueSettings, ReconcileSettings, RunSettings,
    SyncSettings,
};

/// Leaf strings starting with one of these abort the load with
/// CONFIG_SECRET_DETECTED. Config carries env var names, never values.
const SECRET_PREFIXES: &[&str] = &[
    "AKIA",       // AWS access key ID
    "ASIA",       // AWS temporary access key ID
    "-----BEGIN", // PEM private keys
    "sk-",
    "ghp_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

// ---------------------------------------------------------------------------
// Run mode + unused-key guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Simulated or local-output delivery.
    DryRun,
    /// Real queue delivery.
    Live,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::DryRun => "DRY_RUN",
            RunMode::Live => "LIVE",
        }
    }

    /// Unused keys are a warning in dry-run and an error in live.
    pub fn unused_key_policy(&self) -> UnusedKeyPolicy {
        match self {
            RunMode::DryRun => UnusedKeyPolicy::Warn,
            RunMode::Live => UnusedKeyPolicy::Fail,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub mode: String,
    /// Consumed JSON-pointer prefixes (sorted, unique).
    pub consumed_prefixes: Vec<String>,
    /// Leaf pointers not covered by any consumed prefix (sorted).
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// JSON-pointer prefixes read in each mode. A prefix consumes every leaf
/// beneath it. Keep this in step with what [`SyncSettings`] and
/// [`secrets::resolve_secrets`] actually read.
pub fn consumed_pointers_for_mode(mode: RunMode) -> &'static [&'static str] {
    match mode {
        RunMode::DryRun => &[
            "/run",
            "/primary",
            "/secondary",
            "/reconcile",
            "/delivery",
            "/dry_run",
        ],
        RunMode::Live => &[
            "/run",
            "/primary",
            "/secondary",
            "/reconcile",
            "/delivery",
            "/queue",
        ],
    }
}

/// Report leaves of `config_json` that `mode` never reads.
/// With [`UnusedKeyPolicy::Fail`] a non-clean report is an error.
pub fn report_unused_keys(
    mode: RunMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = consumed_pointers_for_mode(mode)
        .iter()
        .map(|p| normalize_pointer(p))
        .collect();
    let consumed_prefixes: Vec<String> = consumed.into_iter().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|leaf| !consumed_prefixes.iter().any(|cp| is_prefix_pointer(cp, leaf)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        mode: mode.as_str().to_string(),
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if !report.is_clean() {
        if policy == UnusedKeyPolicy::Fail {
            bail!(
                "CONFIG_UNUSED_KEYS (mode={}): {} unused config leaf key(s): {}",
                report.mode,
                report.unused_leaf_pointers.len(),
                preview_list(&report.unused_leaf_pointers, 12)
            );
        }
        tracing::warn!(
            mode = %report.mode,
            unused = %preview_list(&report.unused_leaf_pointers, 12),
            "config keys not read in this mode"
        );
    }

    Ok(report)
}

fn normalize_pointer(p: &str) -> String {
    let mut s = p.trim().to_string();
    if s.is_empty() {
        return "/".to_string();
    }
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    while s.ends_with('/') && s.len() > 1 {
        s.pop();
    }
    s
}

/// "/a/b" covers "/a/b" and "/a/b/c" but not "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" || leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                collect_leaf_pointers(vv, &format!("{}/{}", prefix, i), out);
            }
        }
        _ => out.push(if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }),
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    format!("{:?}", items.iter().take(n).collect::<Vec<_>>())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Empty configuration: every setting takes its default.
    pub fn empty() -> Result<Self> {
        load_layered_yaml_from_strings(&[])
    }

    pub fn settings(&self) -> Result<SyncSettings> {
        SyncSettings::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml<P: AsRef<std::path::Path>>(paths: &[P]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::with_capacity(paths.len());
    for p in paths {
        let p = p.as_ref();
        let raw = fs::read_to_string(p)
            .with_context(|| format!("failed to read yaml path: {}", p.display()))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        // An empty document parses as null; treat it as an empty layer.
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; any other value in `b` replaces `a`.
pub fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

// serde_json's default Map is ordered by key, so compact serialization is
// already canonical.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
