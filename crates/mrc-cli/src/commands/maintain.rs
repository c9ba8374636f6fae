//! `mrc prune-deleted` and `mrc update-emails`

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mrc_config::RunMode;
use mrc_ingest::DelimitedLineReader;
use mrc_reconcile::{LineValidator, MergeJoin, MirrorPolicy, Source};
use mrc_runtime::{run_maintenance, MaintenanceOutcome, MirrorLayout, TracingReporter};

use super::load_config;

/// Change feeds are `key,<identity field>` exports.
const CHANGE_FEED_SEPARATOR: char = ',';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Maintenance {
    PruneDeleted,
    UpdateEmails,
}

pub struct MaintainArgs<'a> {
    pub feed: &'a Path,
    pub mirror: &'a Path,
    /// New mirror destination; stdout when absent.
    pub output: Option<&'a Path>,
    /// Count only; write nothing.
    pub dry_run: bool,
    pub config_paths: &'a [PathBuf],
}

pub fn run(kind: Maintenance, args: &MaintainArgs<'_>) -> Result<i32> {
    let (_, settings) = load_config(args.config_paths, RunMode::DryRun)?;
    let identity = settings.reconcile.identity_field.clone();
    let policy = match kind {
        Maintenance::PruneDeleted => MirrorPolicy::RemoveDeleted,
        Maintenance::UpdateEmails => MirrorPolicy::UpdateEmails {
            field: identity.clone(),
        },
    };
    let feed_columns = ["uid".to_string(), identity];

    let feed = DelimitedLineReader::open(args.feed, CHANGE_FEED_SEPARATOR)
        .with_context(|| format!("open change feed {}", args.feed.display()))?;
    let mirror = DelimitedLineReader::open(args.mirror, settings.secondary.separator)
        .with_context(|| format!("open {} feed", settings.secondary.name))?;
    let join = MergeJoin::new(
        feed,
        LineValidator::new(Source::Primary, feed_columns),
        mirror,
        LineValidator::new(Source::Secondary, settings.secondary.columns.clone()),
    );
    let layout = MirrorLayout {
        columns: settings.secondary.columns.clone(),
        separator: settings.secondary.separator,
    };

    tracing::info!(
        policy = policy.name(),
        feed = %args.feed.display(),
        mirror = %args.mirror.display(),
        dry_run = args.dry_run,
        "maintenance start"
    );
    let mut reporter = TracingReporter;
    let interval = settings.run.progress_interval;

    let outcome = if args.dry_run {
        run_maintenance(join, &policy, &layout, &mut io::sink(), &mut reporter, interval)?
    } else if let Some(path) = args.output {
        write_file(path, |out| {
            run_maintenance(join, &policy, &layout, out, &mut reporter, interval)
        })?
    } else {
        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        run_maintenance(join, &policy, &layout, &mut out, &mut reporter, interval)?
    };

    let counts = serde_json::to_value(outcome.counts()).context("serialize counts")?;
    let report = serde_json::json!({
        "policy": policy.name(),
        "counts": counts,
        "total_mirror": outcome.counts().total_mirror(),
        "total_feed": outcome.counts().total_feed(),
    });
    eprintln!("{}", serde_json::to_string_pretty(&report).context("serialize counts")?);
    if let MaintenanceOutcome::Fatal { error, .. } = &outcome {
        eprintln!("FATAL: {error}");
    }
    Ok(outcome.exit_code())
}

/// Write through `<path>.partial`; the final name appears only on completion.
fn write_file<F>(path: &Path, run: F) -> Result<MaintenanceOutcome>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<MaintenanceOutcome>,
{
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let file = File::create(&partial).with_context(|| format!("create {}", partial.display()))?;
    let mut out = BufWriter::new(file);
    let outcome = run(&mut out).with_context(|| format!("write {}", partial.display()))?;
    out.flush().with_context(|| format!("write {}", partial.display()))?;

    if outcome.is_fatal() {
        tracing::warn!(partial = %partial.display(), "mirror left incomplete");
    } else {
        std::fs::rename(&partial, path)
            .with_context(|| format!("rename {} to {}", partial.display(), path.display()))?;
    }
    Ok(outcome)
}
