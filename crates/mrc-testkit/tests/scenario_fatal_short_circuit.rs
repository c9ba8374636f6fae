//! Scenario: Fatal Short Circuit
//!
//! # Invariants under test
//!
//! 1. Two swapped PRIMARY rows end the run FATAL, naming the regressed key.
//! 2. No key past the last accepted PRIMARY key reaches the transport.
//! 3. Partial counts still satisfy `total() == read_units` and every
//!    actionable event is sent, failed or abandoned.
//! 4. The completion signal is never raised.

use std::sync::Arc;

use mrc_delivery::DeliveryConfig;
use mrc_reconcile::{FatalError, Source};
use mrc_runtime::{RunOptions, RunOutcome};
use mrc_testkit::{generate_fixture, run_fixture, FixtureSpec, RecordingTransport};

#[tokio::test]
async fn swapped_primary_rows_abort_the_run() {
    let mut fixture = generate_fixture(FixtureSpec {
        count: 200,
        seed: Some(77),
        ..FixtureSpec::default()
    });
    assert!(fixture.primary_lines.len() > 40);
    fixture.primary_lines.swap(30, 31);
    let high = fixture.primary_lines[30][..32].to_string();
    let low = fixture.primary_lines[31][..32].to_string();
    assert!(low < high);

    let transport = Arc::new(RecordingTransport::new());
    let run = run_fixture(
        &fixture,
        transport.clone(),
        DeliveryConfig::default(),
        RunOptions {
            progress_interval: 0,
            read_ahead: 2,
        },
    )
    .await;

    match &run.outcome {
        RunOutcome::Fatal {
            error: FatalError::OutOfOrder(v),
            counts,
        } => {
            assert_eq!(v.source, Source::Primary);
            assert_eq!(v.key, low);
            assert_eq!(v.previous, high);
            assert_eq!(counts.total(), counts.read_units);
            assert!(counts.deliveries_resolved());
            assert!(counts.actionable() > 0);
        }
        other => panic!("expected out-of-order fatal, got {:?}", other),
    }

    assert!(transport.delivered_keys().iter().all(|k| k <= &high));
    assert_eq!(run.reporter.fatal.len(), 1);
    assert!(run.reporter.completed.is_none());
}
