//! In-process transport and reporter that remember everything they see.

use std::collections::BTreeSet;
use std::sync::Mutex;

use mrc_delivery::{
    BatchFailure, BatchResponse, BatchSuccess, QueueMessage, QueueTransport, SendReceipt,
    TransportError,
};
use mrc_reconcile::FatalError;
use mrc_runtime::{RecoverableError, RunCounts, RunReporter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCall {
    One { key: String },
    Batch { keys: Vec<String> },
}

impl TransportCall {
    pub fn keys(&self) -> Vec<&str> {
        match self {
            TransportCall::One { key } => vec![key.as_str()],
            TransportCall::Batch { keys } => keys.iter().map(String::as_str).collect(),
        }
    }
}

/// Accepts every message except those whose key is in the failing set.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    failing: BTreeSet<String>,
    calls: Mutex<Vec<TransportCall>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing<T: Into<String>>(keys: impl IntoIterator<Item = T>) -> Self {
        Self {
            failing: keys.into_iter().map(Into::into).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Every key handed to the transport, in call order.
    pub fn delivered_keys(&self) -> Vec<String> {
        self.calls()
            .iter()
            .flat_map(|c| c.keys().into_iter().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    fn record(&self, call: TransportCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait::async_trait]
impl QueueTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_one(&self, message: &QueueMessage) -> Result<SendReceipt, TransportError> {
        self.record(TransportCall::One {
            key: message.event.key.clone(),
        });
        if self.failing.contains(&message.event.key) {
            return Err(TransportError::Rejected(format!(
                "key {} is configured to fail",
                message.event.key
            )));
        }
        Ok(SendReceipt {
            message_id: format!("rec-{}", message.id),
        })
    }

    async fn send_batch(&self, messages: &[QueueMessage]) -> Result<BatchResponse, TransportError> {
        self.record(TransportCall::Batch {
            keys: messages.iter().map(|m| m.event.key.clone()).collect(),
        });
        let mut resp = BatchResponse::default();
        for m in messages {
            if self.failing.contains(&m.event.key) {
                resp.failed.push(BatchFailure {
                    id: m.id.clone(),
                    reason: format!("key {} is configured to fail", m.event.key),
                    sender_fault: true,
                });
            } else {
                resp.successful.push(BatchSuccess {
                    id: m.id.clone(),
                    message_id: format!("rec-{}", m.id),
                });
            }
        }
        Ok(resp)
    }
}

/// Keeps every run signal for later assertions.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub progress: Vec<u64>,
    pub recoverable: Vec<RecoverableError>,
    pub fatal: Vec<FatalError>,
    /// Keys of sent events, in signal order.
    pub sent: Vec<String>,
    /// `(key, reason)` per write error.
    pub write_errors: Vec<(String, String)>,
    pub completed: Option<RunCounts>,
}

impl RunReporter for CollectingReporter {
    fn progress(&mut self, read_units: u64) {
        self.progress.push(read_units);
    }

    fn recoverable_error(&mut self, error: &RecoverableError) {
        self.recoverable.push(error.clone());
    }

    fn fatal_error(&mut self, error: &FatalError) {
        self.fatal.push(error.clone());
    }

    fn sent(&mut self, message: &QueueMessage) {
        self.sent.push(message.event.key.clone());
    }

    fn write_error(&mut self, message: &QueueMessage, reason: &str) {
        self.write_errors
            .push((message.event.key.clone(), reason.to_string()));
    }

    fn completed(&mut self, counts: &RunCounts) {
        self.completed = Some(counts.clone());
    }
}
