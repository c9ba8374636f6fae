//! `mrc reconcile`

use std::path::Path;

use anyhow::{Context, Result};
use mrc_ingest::DelimitedLineReader;
use mrc_reconcile::{FieldNormalizer, LineValidator, MergeJoin, ReconcilePolicy, Source};
use mrc_runtime::{RunCoordinator, TracingReporter};

use super::{build_pipeline, build_transport, finish, load_settings, run_options, run_timestamp};
use crate::DeliveryArgs;

pub async fn run(
    primary: &Path,
    secondary: &Path,
    ts: Option<&str>,
    args: &DeliveryArgs,
) -> Result<i32> {
    let (loaded, settings) = load_settings(args)?;
    let timestamp = run_timestamp(ts, primary)?;

    let primary_reader = DelimitedLineReader::open(primary, settings.primary.separator)
        .with_context(|| format!("open {} feed", settings.primary.name))?;
    let secondary_reader = DelimitedLineReader::open(secondary, settings.secondary.separator)
        .with_context(|| format!("open {} feed", settings.secondary.name))?;

    let join = MergeJoin::new(
        primary_reader,
        LineValidator::new(Source::Primary, settings.primary.columns.clone()),
        secondary_reader,
        LineValidator::new(Source::Secondary, settings.secondary.columns.clone()),
    );
    let policy = ReconcilePolicy::new(timestamp)
        .with_primary_normalizer(FieldNormalizer::with_base64_fields(
            settings.primary.base64_fields.clone(),
        ))
        .with_secondary_normalizer(FieldNormalizer::with_base64_fields(
            settings.secondary.base64_fields.clone(),
        ))
        .with_identity_field(settings.reconcile.identity_field.clone());

    let transport = build_transport(args, &loaded, &settings)?;
    let transport_name = transport.name();
    let pipeline = build_pipeline(transport, &settings);
    let mut coordinator = RunCoordinator::new(policy, pipeline, TracingReporter, run_options(&settings));

    tracing::info!(
        run_id = %coordinator.run_id(),
        primary = %primary.display(),
        secondary = %secondary.display(),
        ts = %timestamp.to_rfc3339(),
        transport = transport_name,
        "reconcile start"
    );
    let outcome = coordinator.run(join).await;
    finish(&outcome)
}
