//! `mrc reconcile-diff`

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use mrc_ingest::DiffEventReader;
use mrc_reconcile::ReconcilePolicy;
use mrc_runtime::{RunCoordinator, TracingReporter};

use super::{build_pipeline, build_transport, finish, load_settings, run_options, run_timestamp};
use crate::DeliveryArgs;

pub async fn run(input: &Path, ts: Option<&str>, args: &DeliveryArgs) -> Result<i32> {
    let (loaded, settings) = load_settings(args)?;
    let timestamp = run_timestamp(ts, input)?;
    let file = File::open(input).with_context(|| format!("open {}", input.display()))?;
    let events = DiffEventReader::new(BufReader::new(file), settings.primary.separator, timestamp);

    let transport = build_transport(args, &loaded, &settings)?;
    let pipeline = build_pipeline(transport, &settings);
    // Events are decided by the diff itself; the policy is unused.
    let mut coordinator = RunCoordinator::new(
        ReconcilePolicy::new(timestamp),
        pipeline,
        TracingReporter,
        run_options(&settings),
    );

    tracing::info!(
        run_id = %coordinator.run_id(),
        input = %input.display(),
        ts = %timestamp.to_rfc3339(),
        "reconcile-diff start"
    );
    let outcome = coordinator.replay("diff", events).await;
    finish(&outcome)
}
