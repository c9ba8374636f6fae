//! `mrc replay`

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use mrc_ingest::EventLineReader;
use mrc_reconcile::ReconcilePolicy;
use mrc_runtime::{RunCoordinator, TracingReporter};

use super::{build_pipeline, build_transport, finish, load_settings, run_options};
use crate::DeliveryArgs;

pub async fn run(input: &Path, args: &DeliveryArgs) -> Result<i32> {
    let (loaded, settings) = load_settings(args)?;
    let file = File::open(input).with_context(|| format!("open {}", input.display()))?;

    let transport = build_transport(args, &loaded, &settings)?;
    let pipeline = build_pipeline(transport, &settings);
    // Replayed events keep their recorded timestamps; the policy is unused.
    let mut coordinator = RunCoordinator::new(
        ReconcilePolicy::new(Utc::now()),
        pipeline,
        TracingReporter,
        run_options(&settings),
    );

    tracing::info!(run_id = %coordinator.run_id(), input = %input.display(), "replay start");
    let outcome = coordinator
        .replay("replay", EventLineReader::new(BufReader::new(file)))
        .await;
    finish(&outcome)
}
