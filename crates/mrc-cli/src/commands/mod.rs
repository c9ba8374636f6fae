//! Command handler modules for the `mrc` binary.
//!
//! Shared setup (config, transport selection, run timestamp, final report)
//! lives here. Command-specific logic lives in the submodules.

pub mod diff;
pub mod generate;
pub mod maintain;
pub mod reconcile;
pub mod replay;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use mrc_config::secrets::resolve_secrets;
use mrc_config::{load_layered_yaml, report_unused_keys, LoadedConfig, RunMode, SyncSettings};
use mrc_delivery::{
    DeliveryConfig, DeliveryPipeline, DryRunTransport, JsonLinesTransport, MessageCodec,
    QueueTransport, SqsHttpTransport,
};
use mrc_runtime::{RunOptions, RunOutcome};

use crate::DeliveryArgs;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

pub fn run_mode(args: &DeliveryArgs) -> RunMode {
    if args.go {
        RunMode::Live
    } else {
        RunMode::DryRun
    }
}

/// Load layered config (or defaults), apply the unused-key guard for the
/// mode, and return typed settings.
pub fn load_settings(args: &DeliveryArgs) -> Result<(LoadedConfig, SyncSettings)> {
    load_config(&args.config_paths, run_mode(args))
}

pub fn load_config(paths: &[PathBuf], mode: RunMode) -> Result<(LoadedConfig, SyncSettings)> {
    let loaded = if paths.is_empty() {
        LoadedConfig::empty()?
    } else {
        load_layered_yaml(paths)?
    };
    report_unused_keys(mode, &loaded.config_json, mode.unused_key_policy())?;
    let settings = loaded.settings()?;
    tracing::info!(
        mode = mode.as_str(),
        config_hash = %loaded.config_hash,
        layers = paths.len(),
        "config loaded"
    );
    Ok((loaded, settings))
}

pub fn run_options(settings: &SyncSettings) -> RunOptions {
    RunOptions {
        progress_interval: settings.run.progress_interval,
        read_ahead: settings.run.read_ahead,
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

pub fn build_transport(
    args: &DeliveryArgs,
    loaded: &LoadedConfig,
    settings: &SyncSettings,
) -> Result<Arc<dyn QueueTransport>> {
    if args.jsonout {
        return Ok(Arc::new(JsonLinesTransport::stdout()));
    }

    if !args.go {
        let rate = args.failure_rate.unwrap_or(settings.dry_run.failure_rate);
        if !(0.0..=1.0).contains(&rate) {
            bail!("--failure-rate must be within [0, 1], got {}", rate);
        }
        return Ok(Arc::new(DryRunTransport::new(rate, settings.dry_run.seed)));
    }

    let secrets = resolve_secrets(&loaded.config_json, RunMode::Live)?;
    let url = args
        .url
        .clone()
        .or_else(|| settings.queue.url.clone())
        .context("--go requires a queue url (--url or queue.url)")?;

    // Requests go out unsigned, so a signing endpoint is mandatory.
    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| settings.queue.endpoint.clone())
        .context("--go requires a queue endpoint that signs requests (--endpoint or queue.endpoint)")?;

    let transport =
        SqsHttpTransport::new(endpoint, url).with_auth_token(secrets.queue_auth_token);
    tracing::info!(endpoint = transport.endpoint(), "live delivery");
    Ok(Arc::new(transport))
}

pub fn build_pipeline(transport: Arc<dyn QueueTransport>, settings: &SyncSettings) -> DeliveryPipeline {
    DeliveryPipeline::new(
        transport,
        MessageCodec::with_epoch_ms_fields(settings.delivery.epoch_ms_fields.iter().cloned()),
        DeliveryConfig {
            max_batch_size: settings.delivery.max_batch_size,
            max_in_flight: settings.delivery.max_in_flight,
        },
    )
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// `--ts` as epoch seconds (fractional allowed) or RFC 3339; otherwise the
/// modification time of `fallback`.
pub fn run_timestamp(ts: Option<&str>, fallback: &Path) -> Result<DateTime<Utc>> {
    if let Some(raw) = ts {
        let raw = raw.trim();
        if let Ok(secs) = raw.parse::<f64>() {
            return Utc
                .timestamp_millis_opt((secs * 1000.0).round() as i64)
                .single()
                .with_context(|| format!("--ts out of range: {raw}"));
        }
        return DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("--ts must be epoch seconds or RFC 3339, got '{raw}'"));
    }

    let modified = std::fs::metadata(fallback)
        .and_then(|m| m.modified())
        .with_context(|| format!("read modification time of {}", fallback.display()))?;
    Ok(DateTime::<Utc>::from(modified))
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Print final counts as JSON on stderr and map the outcome to an exit code.
pub fn finish(outcome: &RunOutcome) -> Result<i32> {
    let counts = serde_json::to_string_pretty(outcome.counts()).context("serialize counts")?;
    eprintln!("{counts}");
    if let RunOutcome::Fatal { error, .. } = outcome {
        eprintln!("FATAL: {error}");
    }
    Ok(outcome.exit_code())
}
