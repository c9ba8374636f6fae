//! One-call wiring of a fixture through the real coordinator.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use mrc_delivery::{DeliveryConfig, DeliveryPipeline, MessageCodec, QueueTransport};
use mrc_reconcile::{FieldNormalizer, LineValidator, MergeJoin, ReconcilePolicy, Source};
use mrc_runtime::{RunCoordinator, RunOptions, RunOutcome};

use crate::{CollectingReporter, Fixture};

pub const PRIMARY_COLUMNS: [&str; 4] = ["uid", "email", "locale", "createDate"];
pub const SECONDARY_COLUMNS: [&str; 2] = ["uid", "email"];

pub fn fixed_timestamp() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_526_936_236_748)
        .single()
        .unwrap_or_default()
}

/// Policy for the fixture layouts: PRIMARY email/locale base64, SECONDARY plain.
pub fn fixture_policy(ts: DateTime<Utc>) -> ReconcilePolicy {
    ReconcilePolicy::new(ts)
        .with_primary_normalizer(FieldNormalizer::with_base64_fields(["email", "locale"]))
}

pub struct FixtureRun {
    pub outcome: RunOutcome,
    pub reporter: CollectingReporter,
}

pub async fn run_fixture(
    fixture: &Fixture,
    transport: Arc<dyn QueueTransport>,
    delivery: DeliveryConfig,
    options: RunOptions,
) -> FixtureRun {
    let join = MergeJoin::new(
        fixture.primary_source(),
        LineValidator::new(Source::Primary, PRIMARY_COLUMNS),
        fixture.secondary_source(),
        LineValidator::new(Source::Secondary, SECONDARY_COLUMNS),
    );
    let pipeline = DeliveryPipeline::new(transport, MessageCodec::default(), delivery);
    let mut coordinator = RunCoordinator::new(
        fixture_policy(fixed_timestamp()),
        pipeline,
        CollectingReporter::default(),
        options,
    );
    let outcome = coordinator.run(join).await;
    FixtureRun {
        outcome,
        reporter: coordinator.into_reporter(),
    }
}
