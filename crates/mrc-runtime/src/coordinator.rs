//! Run coordinator for one reconciliation (or replay) run.
//!
//! # Invariants
//!
//! - **Single writer**: counts, histogram and pipeline are touched only by
//!   the control loop in [`RunCoordinator::drive`].
//! - **Bounded read-ahead**: the reader blocks once `read_ahead` items are
//!   queued; the pipeline blocks submission once `max_in_flight` calls are
//!   outstanding. Reading never runs unboundedly ahead of delivery.
//! - **Fatal short-circuit**: after a fatal signal no event is submitted;
//!   in-flight calls complete and count, undispatched events are counted as
//!   `abandoned`.
//! - **Always report**: both terminal phases hand back the counts.
//! - **Runs once**: the terminal outcome is kept; later calls return it.

use mrc_delivery::{DeliveryOutcome, DeliveryPipeline};
use mrc_ingest::EventLineError;
use mrc_reconcile::{
    BucketHistogram, Event, FatalError, MergeJoin, MergeStep, RecordSource, ReconcilePolicy,
    SourceReadError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{RecoverableError, RunCounts, RunReporter};

// ---------------------------------------------------------------------------
// Phase / outcome
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Running,
    Completed,
    Fatal,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Init => "INIT",
            RunPhase::Running => "RUNNING",
            RunPhase::Completed => "COMPLETED",
            RunPhase::Fatal => "FATAL",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Fatal)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Completed(RunCounts),
    /// Partial counts up to the abort.
    Fatal { error: FatalError, counts: RunCounts },
}

impl RunOutcome {
    pub fn counts(&self) -> &RunCounts {
        match self {
            RunOutcome::Completed(c) | RunOutcome::Fatal { counts: c, .. } => c,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RunOutcome::Fatal { .. })
    }

    pub fn phase(&self) -> RunPhase {
        if self.is_fatal() {
            RunPhase::Fatal
        } else {
            RunPhase::Completed
        }
    }

    /// Process exit code: 0 on completion, 1 on fatal.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.is_fatal())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunOptions {
    /// Emit `progress` every N read units (0 disables periodic progress).
    pub progress_interval: u64,
    /// Items the reader may queue ahead of the control loop.
    pub read_ahead: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            progress_interval: 10_000,
            read_ahead: 1_024,
        }
    }
}

// ---------------------------------------------------------------------------
// Reader side
// ---------------------------------------------------------------------------

enum Pulled {
    Step(MergeStep),
    /// Already-decided event (replay).
    Event(Event),
    Skipped(RecoverableError),
    Finished {
        result: Result<(), FatalError>,
        primary_records: u64,
        secondary_records: u64,
    },
}

fn produce_merge<P: RecordSource, S: RecordSource>(mut join: MergeJoin<P, S>, tx: mpsc::Sender<Pulled>) {
    loop {
        let next = join.next_step();
        for r in join.drain_rejections() {
            if tx.blocking_send(Pulled::Skipped(r.into())).is_err() {
                return;
            }
        }
        let item = match next {
            Ok(Some(step)) => Pulled::Step(step),
            Ok(None) => Pulled::Finished {
                result: Ok(()),
                primary_records: join.primary_records(),
                secondary_records: join.secondary_records(),
            },
            Err(e) => Pulled::Finished {
                result: Err(e),
                primary_records: join.primary_records(),
                secondary_records: join.secondary_records(),
            },
        };
        let last = matches!(item, Pulled::Finished { .. });
        if tx.blocking_send(item).is_err() || last {
            return;
        }
    }
}

fn produce_events<I>(input: &'static str, events: I, tx: mpsc::Sender<Pulled>)
where
    I: Iterator<Item = Result<Event, EventLineError>>,
{
    let mut records = 0;
    for item in events {
        let pulled = match item {
            Ok(event) => {
                records += 1;
                Pulled::Event(event)
            }
            Err(e) if e.is_recoverable() => {
                let line_no = match &e {
                    EventLineError::Decode { line_no, .. } => *line_no,
                    _ => 0,
                };
                Pulled::Skipped(RecoverableError {
                    source: input.to_string(),
                    key: String::new(),
                    line_no,
                    message: e.to_string(),
                })
            }
            Err(e) => {
                let error = match e {
                    EventLineError::Malformed { line_no, message } => {
                        SourceReadError::new(Some(line_no), message)
                    }
                    other => SourceReadError::new(None, other.to_string()),
                };
                let _ = tx.blocking_send(Pulled::Finished {
                    result: Err(FatalError::EventInput(error)),
                    primary_records: records,
                    secondary_records: 0,
                });
                return;
            }
        };
        if tx.blocking_send(pulled).is_err() {
            return;
        }
    }
    let _ = tx.blocking_send(Pulled::Finished {
        result: Ok(()),
        primary_records: records,
        secondary_records: 0,
    });
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct RunCoordinator<R> {
    run_id: Uuid,
    policy: ReconcilePolicy,
    pipeline: DeliveryPipeline,
    reporter: R,
    options: RunOptions,
    phase: RunPhase,
    outcome: Option<RunOutcome>,
    counts: RunCounts,
    histogram: BucketHistogram,
}

impl<R: RunReporter> RunCoordinator<R> {
    pub fn new(
        policy: ReconcilePolicy,
        pipeline: DeliveryPipeline,
        reporter: R,
        options: RunOptions,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            policy,
            pipeline,
            reporter,
            options,
            phase: RunPhase::Init,
            outcome: None,
            counts: RunCounts::default(),
            histogram: BucketHistogram::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Terminal outcome, once the run has ended.
    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn into_reporter(self) -> R {
        self.reporter
    }

    /// Reconcile two feeds. A coordinator runs once; later calls return the
    /// first run's outcome without reading anything.
    pub async fn run<P, S>(&mut self, join: MergeJoin<P, S>) -> RunOutcome
    where
        P: RecordSource + 'static,
        S: RecordSource + 'static,
    {
        if let Some(done) = self.already_run() {
            return done;
        }
        let (tx, rx) = mpsc::channel(self.options.read_ahead.max(1));
        let reader = tokio::task::spawn_blocking(move || produce_merge(join, tx));
        self.drive(rx, reader).await
    }

    /// Deliver pre-decided events: a JSON-lines stream from an earlier run or
    /// the events of a diff. `input` labels skipped lines in the report.
    pub async fn replay<I>(&mut self, input: &'static str, events: I) -> RunOutcome
    where
        I: Iterator<Item = Result<Event, EventLineError>> + Send + 'static,
    {
        if let Some(done) = self.already_run() {
            return done;
        }
        let (tx, rx) = mpsc::channel(self.options.read_ahead.max(1));
        let reader = tokio::task::spawn_blocking(move || produce_events(input, events, tx));
        self.drive(rx, reader).await
    }

    fn already_run(&self) -> Option<RunOutcome> {
        if self.phase == RunPhase::Init {
            return None;
        }
        tracing::warn!(run_id = %self.run_id, phase = self.phase.as_str(), "run already started");
        if self.phase.is_terminal() {
            self.outcome.clone()
        } else {
            Some(RunOutcome::Completed(self.counts.clone()))
        }
    }

    fn transition(&mut self, to: RunPhase) {
        tracing::info!(
            run_id = %self.run_id,
            from = self.phase.as_str(),
            to = to.as_str(),
            "run phase"
        );
        self.phase = to;
    }

    async fn drive(&mut self, mut rx: mpsc::Receiver<Pulled>, reader: JoinHandle<()>) -> RunOutcome {
        self.transition(RunPhase::Running);

        let finished = loop {
            tokio::select! {
                biased;

                Some(outcomes) = self.pipeline.next_completed(), if self.pipeline.in_flight() > 0 => {
                    self.absorb(outcomes);
                }

                pulled = rx.recv() => match pulled {
                    Some(Pulled::Step(step)) => {
                        self.count_read_unit();
                        let decision = self.policy.decide(step);
                        self.counts.apply_decision(&decision);
                        if let Some(event) = decision.into_event() {
                            self.deliver(event).await;
                        }
                    }
                    Some(Pulled::Event(event)) => {
                        self.count_read_unit();
                        self.counts.apply_kind(event.kind);
                        self.deliver(event).await;
                    }
                    Some(Pulled::Skipped(err)) => {
                        self.count_read_unit();
                        self.counts.error += 1;
                        self.reporter.recoverable_error(&err);
                    }
                    Some(Pulled::Finished { result, primary_records, secondary_records }) => {
                        self.counts.primary_records = primary_records;
                        self.counts.secondary_records = secondary_records;
                        break result;
                    }
                    None => break Err(FatalError::ReaderStopped),
                },
            }
        };

        drop(rx);
        if let Err(e) = reader.await {
            tracing::error!(run_id = %self.run_id, error = %e, "reader task failed");
        }

        let outcome = match finished {
            Ok(()) => {
                let outcomes = self.pipeline.flush().await;
                self.absorb(outcomes);
                self.finalize_stats();
                self.transition(RunPhase::Completed);
                self.reporter.progress(self.counts.read_units);
                self.reporter.completed(&self.counts);
                RunOutcome::Completed(self.counts.clone())
            }
            Err(error) => {
                let (outcomes, unsent) = self.pipeline.abort().await;
                self.absorb(outcomes);
                self.counts.abandoned = unsent.len() as u64;
                if !unsent.is_empty() {
                    tracing::warn!(
                        run_id = %self.run_id,
                        abandoned = unsent.len(),
                        "undispatched events dropped after fatal error"
                    );
                }
                self.finalize_stats();
                self.transition(RunPhase::Fatal);
                self.reporter.fatal_error(&error);
                RunOutcome::Fatal {
                    error,
                    counts: self.counts.clone(),
                }
            }
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    fn count_read_unit(&mut self) {
        self.counts.read_units += 1;
        let every = self.options.progress_interval;
        if every > 0 && self.counts.read_units % every == 0 {
            self.reporter.progress(self.counts.read_units);
        }
    }

    async fn deliver(&mut self, event: Event) {
        self.histogram.record(&event.key);
        let outcomes = self.pipeline.submit(&event).await;
        self.absorb(outcomes);
    }

    fn absorb(&mut self, outcomes: Vec<DeliveryOutcome>) {
        for outcome in outcomes {
            self.counts.apply_outcome(&outcome);
            match &outcome {
                DeliveryOutcome::Sent { message, .. } => self.reporter.sent(message),
                DeliveryOutcome::WriteError { message, reason } => {
                    self.reporter.write_error(message, reason)
                }
            }
        }
    }

    fn finalize_stats(&mut self) {
        self.counts.stats = self.histogram.summarize();
    }
}
