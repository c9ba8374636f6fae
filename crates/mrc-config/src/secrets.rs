//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (`queue.auth_token_env`).
//! - Callers resolve once at startup and pass the result to constructors.
//! - `Debug` redacts values; errors name the variable, never its value.
//!
//! # Mode-aware enforcement
//! - `LIVE`: a configured token variable must be set.
//! - `DRY_RUN`: everything is optional.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::RunMode;

/// Secrets for one run. Values are redacted in `Debug` output.
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    /// Bearer token for the queue endpoint, if one is configured.
    pub queue_auth_token: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "queue_auth_token",
                &self.queue_auth_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let trimmed = config.pointer(pointer)?.as_str()?.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// `None` when unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

pub fn resolve_secrets(config_json: &Value, mode: RunMode) -> Result<ResolvedSecrets> {
    let Some(var) = read_str_at(config_json, "/queue/auth_token_env") else {
        return Ok(ResolvedSecrets::default());
    };

    let token = resolve_env(&var);
    if token.is_none() && mode == RunMode::Live {
        bail!(
            "SECRETS_MISSING mode={}: required env var '{}' (queue auth token) is not set or empty",
            mode.as_str(),
            var
        );
    }

    Ok(ResolvedSecrets {
        queue_auth_token: token,
    })
}
