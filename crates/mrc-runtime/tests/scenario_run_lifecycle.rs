//! Scenario: Run Lifecycle
//!
//! # Invariants under test
//!
//! 1. A clean run ends COMPLETED with decision counts matching the inputs and
//!    every actionable event delivered.
//! 2. `total() == read_units`: malformed lines count once as `error`.
//! 3. A sort violation ends FATAL with partial counts; no event for a key
//!    past the violation is ever handed to the transport.
//! 4. A source read failure is fatal.
//! 5. Replay delivers decoded events and skips undecodable lines.
//! 6. A replay input that fails mid-stream is fatal and names the event
//!    input, not a feed.
//! 7. A coordinator runs once: calling it again hands back the stored
//!    outcome, FATAL included.

use std::io::{self, BufRead, Cursor, Read};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use mrc_delivery::{
    BatchResponse, BatchSuccess, DeliveryConfig, DeliveryPipeline, MessageCodec, QueueMessage,
    QueueTransport, SendReceipt, TransportError,
};
use mrc_ingest::{write_event_line, DiffEventReader, EventLineReader};
use mrc_reconcile::{
    Event, EventKind, FatalError, LineValidator, MemorySource, MergeJoin, Record, ReconcilePolicy,
    Source,
};
use mrc_runtime::{
    RecoverableError, RunCoordinator, RunCounts, RunOptions, RunOutcome, RunPhase, RunReporter,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct InstantTransport {
    keys: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl QueueTransport for InstantTransport {
    fn name(&self) -> &'static str {
        "instant"
    }

    async fn send_one(&self, message: &QueueMessage) -> Result<SendReceipt, TransportError> {
        self.keys.lock().unwrap().push(message.event.key.clone());
        Ok(SendReceipt {
            message_id: message.id.clone(),
        })
    }

    async fn send_batch(&self, messages: &[QueueMessage]) -> Result<BatchResponse, TransportError> {
        let mut keys = self.keys.lock().unwrap();
        let mut resp = BatchResponse::default();
        for m in messages {
            keys.push(m.event.key.clone());
            resp.successful.push(BatchSuccess {
                id: m.id.clone(),
                message_id: m.id.clone(),
            });
        }
        Ok(resp)
    }
}

#[derive(Default)]
struct Recorder {
    recoverable: Vec<RecoverableError>,
    fatal: Vec<FatalError>,
    completed: Vec<RunCounts>,
    progress: Vec<u64>,
}

impl RunReporter for Recorder {
    fn progress(&mut self, read_units: u64) {
        self.progress.push(read_units);
    }

    fn recoverable_error(&mut self, error: &RecoverableError) {
        self.recoverable.push(error.clone());
    }

    fn fatal_error(&mut self, error: &FatalError) {
        self.fatal.push(error.clone());
    }

    fn completed(&mut self, counts: &RunCounts) {
        self.completed.push(counts.clone());
    }
}

fn key(n: u32) -> String {
    format!("{:032x}", n)
}

fn ts() -> DateTime<Utc> {
    Utc.timestamp_opt(1_526_936_236, 0).unwrap()
}

fn coordinator(t: Arc<InstantTransport>, progress_interval: u64) -> RunCoordinator<Recorder> {
    let pipeline = DeliveryPipeline::new(t, MessageCodec::default(), DeliveryConfig::default());
    RunCoordinator::new(
        ReconcilePolicy::new(ts()),
        pipeline,
        Recorder::default(),
        RunOptions {
            progress_interval,
            read_ahead: 4,
        },
    )
}

fn join(primary: MemorySource, secondary: MemorySource) -> MergeJoin<MemorySource, MemorySource> {
    MergeJoin::new(
        primary,
        LineValidator::new(Source::Primary, ["uid", "email"]),
        secondary,
        LineValidator::new(Source::Secondary, ["uid", "email"]),
    )
}

fn rows(spec: &[(u32, &str)]) -> MemorySource {
    MemorySource::from_rows(spec.iter().map(|(k, e)| vec![key(*k), e.to_string()]))
}

// ---------------------------------------------------------------------------
// 1 + 2. Clean run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_run_completes_with_exact_counts() {
    let t = Arc::new(InstantTransport::default());
    let mut c = coordinator(t.clone(), 3);
    assert_eq!(c.phase(), RunPhase::Init);

    let mut primary = rows(&[(1, "a@x.com"), (2, "b@x.com"), (4, "new@x.com")]);
    primary.push_row(["not-a-key", "junk@x.com"]);
    primary.push_row([key(6), "f@x.com".to_string()]);
    let secondary = rows(&[(2, "B@x.com"), (3, "c@x.com"), (4, "old@x.com")]);

    let outcome = c.run(join(primary, secondary)).await;
    assert_eq!(c.phase(), RunPhase::Completed);
    assert_eq!(outcome.exit_code(), 0);

    let counts = outcome.counts();
    assert_eq!(counts.create, 2, "keys 1 and 6");
    assert_eq!(counts.update, 1, "key 4");
    assert_eq!(counts.delete, 1, "key 3");
    assert_eq!(counts.ignore, 1, "key 2 differs only in case");
    assert_eq!(counts.error, 1);
    assert_eq!(counts.read_units, 6);
    assert_eq!(counts.total(), counts.read_units);
    assert_eq!(counts.sent, 4);
    assert!(counts.deliveries_resolved());
    assert_eq!(counts.primary_records, 4);
    assert_eq!(counts.secondary_records, 3);
    assert_eq!(counts.stats.sum, 4.0);

    let reporter = c.into_reporter();
    assert_eq!(reporter.recoverable.len(), 1);
    assert_eq!(reporter.recoverable[0].key, "not-a-key");
    assert_eq!(reporter.completed.len(), 1);
    assert!(reporter.fatal.is_empty());
    assert!(reporter.progress.starts_with(&[3, 6]));

    let mut delivered = t.keys.lock().unwrap().clone();
    delivered.sort();
    assert_eq!(delivered, vec![key(1), key(3), key(4), key(6)]);
}

// ---------------------------------------------------------------------------
// 3. Sort violation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sort_violation_aborts_with_partial_counts() {
    let t = Arc::new(InstantTransport::default());
    let mut c = coordinator(t.clone(), 0);

    let primary = rows(&[(1, "a@x.com"), (5, "e@x.com"), (2, "b@x.com"), (9, "i@x.com")]);
    let secondary = rows(&[(3, "c@x.com"), (4, "d@x.com"), (6, "f@x.com")]);

    let outcome = c.run(join(primary, secondary)).await;
    assert!(outcome.is_fatal());
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(c.phase(), RunPhase::Fatal);

    match &outcome {
        RunOutcome::Fatal { error, counts } => {
            assert_eq!(error.feed(), Some(Source::Primary));
            assert_eq!(error.key(), key(2));
            assert_eq!(counts.create, 2);
            assert_eq!(counts.delete, 2);
            assert_eq!(counts.sent + counts.abandoned, 4);
            assert!(counts.deliveries_resolved());
        }
        other => panic!("expected fatal, got {:?}", other),
    }

    let delivered = t.keys.lock().unwrap().clone();
    assert!(delivered.iter().all(|k| k <= &key(5)));
    assert!(!delivered.contains(&key(6)));
    assert!(!delivered.contains(&key(9)));

    let reporter = c.into_reporter();
    assert_eq!(reporter.fatal.len(), 1);
    assert!(reporter.completed.is_empty());
}

// ---------------------------------------------------------------------------
// 4. Read failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_failure_is_fatal() {
    let t = Arc::new(InstantTransport::default());
    let mut c = coordinator(t, 0);

    let primary = rows(&[(1, "a@x.com")]);
    let mut secondary = rows(&[(2, "b@x.com")]);
    secondary.push_failure("disk gone");

    let outcome = c.run(join(primary, secondary)).await;
    match outcome {
        RunOutcome::Fatal {
            error: FatalError::Read { source, error },
            ..
        } => {
            assert_eq!(source, Source::Secondary);
            assert_eq!(error.message, "disk gone");
        }
        other => panic!("expected read failure, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// 5. Replay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replay_delivers_decoded_events() {
    let mut buf = Vec::new();
    for (n, kind) in [(1, EventKind::Create), (2, EventKind::Update), (3, EventKind::Delete)] {
        let ev = Event::new(
            kind,
            Record::new(key(n), Source::Primary).with_field("email", format!("u{n}@x.com")),
            ts(),
        );
        write_event_line(&mut buf, &ev).unwrap();
    }
    buf.extend_from_slice(b"{not json}\n");

    let t = Arc::new(InstantTransport::default());
    let mut c = coordinator(t.clone(), 0);
    let outcome = c.replay("replay", EventLineReader::new(Cursor::new(buf))).await;

    let counts = outcome.counts();
    assert!(!outcome.is_fatal());
    assert_eq!((counts.create, counts.update, counts.delete), (1, 1, 1));
    assert_eq!(counts.error, 1);
    assert_eq!(counts.sent, 3);
    assert_eq!(counts.total(), counts.read_units);
    assert_eq!(t.keys.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn diff_events_replay_in_hunk_order() {
    let diff = format!(
        "@@ -1,2 +1,2 @@\n-{k1},old@x.com\n+{k1},new@x.com\n-{k2},gone@x.com\n+{k3},fresh@x.com\n",
        k1 = key(1),
        k2 = key(2),
        k3 = key(3)
    );
    let t = Arc::new(InstantTransport::default());
    let mut c = coordinator(t.clone(), 0);
    let outcome = c
        .replay("diff", DiffEventReader::new(Cursor::new(diff), ',', ts()))
        .await;

    let counts = outcome.counts();
    assert!(!outcome.is_fatal());
    assert_eq!((counts.create, counts.update, counts.delete), (1, 1, 1));
    assert_eq!(counts.sent, 3);
    assert_eq!(counts.primary_records, 3);
}

// ---------------------------------------------------------------------------
// 6. Event input failure
// ---------------------------------------------------------------------------

/// Serves `good` and then fails every read.
struct FailingAfter {
    good: Cursor<Vec<u8>>,
}

impl Read for FailingAfter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.good.read(buf)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "socket reset"));
        }
        Ok(n)
    }
}

impl BufRead for FailingAfter {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.good.fill_buf()?.is_empty() {
            return Err(io::Error::new(io::ErrorKind::Other, "socket reset"));
        }
        self.good.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.good.consume(amt)
    }
}

#[tokio::test]
async fn replay_io_failure_is_an_event_input_error() {
    let mut buf = Vec::new();
    let ev = Event::new(
        EventKind::Create,
        Record::new(key(1), Source::Primary).with_field("email", "a@x.com"),
        ts(),
    );
    write_event_line(&mut buf, &ev).unwrap();

    let t = Arc::new(InstantTransport::default());
    let mut c = coordinator(t.clone(), 0);
    let reader = FailingAfter {
        good: Cursor::new(buf),
    };
    let outcome = c.replay("replay", EventLineReader::new(reader)).await;

    match &outcome {
        RunOutcome::Fatal { error, counts } => {
            assert!(matches!(error, FatalError::EventInput(_)), "got {:?}", error);
            assert_eq!(error.feed(), None);
            assert_eq!(error.input_name(), "events");
            assert!(error.to_string().contains("socket reset"));
            assert_eq!(counts.create, 1);
            assert!(counts.deliveries_resolved());
        }
        other => panic!("expected fatal, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_diff_is_an_event_input_error() {
    let diff = format!("@@ -1 +1 @@\n+{k},a@x.com\n?garbage\n", k = key(1));
    let t = Arc::new(InstantTransport::default());
    let mut c = coordinator(t.clone(), 0);
    let outcome = c
        .replay("diff", DiffEventReader::new(Cursor::new(diff), ',', ts()))
        .await;

    match outcome {
        RunOutcome::Fatal {
            error: FatalError::EventInput(error),
            counts,
        } => {
            assert_eq!(error.line_no, Some(3));
            assert_eq!(counts.create, 0, "the unfinished hunk is not emitted");
        }
        other => panic!("expected event input error, got {:?}", other),
    }
    assert!(t.keys.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// 7. Runs once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_run_after_fatal_stays_fatal() {
    let t = Arc::new(InstantTransport::default());
    let mut c = coordinator(t.clone(), 0);

    let primary = rows(&[(5, "e@x.com"), (2, "b@x.com")]);
    let first = c.run(join(primary, rows(&[]))).await;
    assert!(first.is_fatal());
    let sent_after_first = t.keys.lock().unwrap().len();

    let again = c.run(join(rows(&[(7, "g@x.com")]), rows(&[]))).await;
    assert_eq!(again, first);
    assert_eq!(again.exit_code(), 1);
    assert_eq!(c.phase(), RunPhase::Fatal);
    assert_eq!(c.outcome(), Some(&first));

    let replayed = c
        .replay("replay", EventLineReader::new(Cursor::new(Vec::new())))
        .await;
    assert!(replayed.is_fatal());
    assert_eq!(t.keys.lock().unwrap().len(), sent_after_first, "nothing new read or sent");
    assert_eq!(c.into_reporter().fatal.len(), 1);
}

#[tokio::test]
async fn second_run_after_completion_returns_same_counts() {
    let t = Arc::new(InstantTransport::default());
    let mut c = coordinator(t, 0);
    let first = c.run(join(rows(&[(1, "a@x.com")]), rows(&[]))).await;
    let again = c.run(join(rows(&[(2, "b@x.com")]), rows(&[]))).await;
    assert_eq!(again, first);
    assert_eq!(again.counts().create, 1);
}
