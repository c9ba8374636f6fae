//! Batched delivery pipeline.
//!
//! # Dispatch rules
//!
//! - Pipeline idle (nothing in flight, nothing pending): the event is sent
//!   immediately with `send_one`.
//! - Otherwise the message joins the pending list. A full pending list
//!   (`max_batch_size`) is dispatched as one `send_batch` call, waiting for a
//!   free slot when `max_in_flight` calls are already outstanding.
//! - When an in-flight call completes, any pending messages are dispatched
//!   as a batch.
//!
//! # Invariants
//!
//! - Every encoded message resolves to exactly one [`DeliveryOutcome`], or is
//!   handed back unsent by [`abort`][DeliveryPipeline::abort].
//! - Batch entries are correlated by id; an entry missing from the response
//!   is a write error, not a silent drop.
//! - At most `max_in_flight` calls outstanding; `submit` blocks otherwise.
//! - Nothing is retried.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mrc_reconcile::Event;
use tokio::task::{Id, JoinSet};
use uuid::Uuid;

use crate::{BatchResponse, MessageCodec, QueueMessage, QueueTransport, SendReceipt};

/// Upper bound on entries in one batch call.
pub const MAX_BATCH_SIZE: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Clamped to `1..=MAX_BATCH_SIZE`.
    pub max_batch_size: usize,
    /// Outstanding transport calls; at least 1.
    pub max_in_flight: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            max_in_flight: 4,
        }
    }
}

impl DeliveryConfig {
    fn clamped(self) -> Self {
        Self {
            max_batch_size: self.max_batch_size.clamp(1, MAX_BATCH_SIZE),
            max_in_flight: self.max_in_flight.max(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeliveryOutcome {
    Sent {
        message: QueueMessage,
        receipt: SendReceipt,
    },
    WriteError {
        message: QueueMessage,
        reason: String,
    },
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent { .. })
    }

    pub fn message(&self) -> &QueueMessage {
        match self {
            DeliveryOutcome::Sent { message, .. } | DeliveryOutcome::WriteError { message, .. } => {
                message
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Batch correlation
// ---------------------------------------------------------------------------

/// Map a batch response back onto the submitted messages, in submit order.
///
/// Ids in the response that were never submitted are ignored (logged).
pub fn correlate_batch(messages: Vec<QueueMessage>, response: BatchResponse) -> Vec<DeliveryOutcome> {
    let submitted: HashSet<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    for id in response
        .successful
        .iter()
        .map(|s| &s.id)
        .chain(response.failed.iter().map(|f| &f.id))
    {
        if !submitted.contains(id.as_str()) {
            tracing::warn!(entry_id = %id, "batch response names an entry that was not submitted");
        }
    }

    let mut ok: HashMap<String, String> = response
        .successful
        .into_iter()
        .map(|s| (s.id, s.message_id))
        .collect();
    let mut failed: HashMap<String, String> = response
        .failed
        .into_iter()
        .map(|f| {
            let reason = if f.sender_fault {
                format!("{} (sender fault)", f.reason)
            } else {
                f.reason
            };
            (f.id, reason)
        })
        .collect();

    messages
        .into_iter()
        .map(|message| {
            if let Some(reason) = failed.remove(&message.id) {
                DeliveryOutcome::WriteError { message, reason }
            } else if let Some(message_id) = ok.remove(&message.id) {
                DeliveryOutcome::Sent {
                    message,
                    receipt: SendReceipt { message_id },
                }
            } else {
                DeliveryOutcome::WriteError {
                    message,
                    reason: "entry missing from batch response".to_string(),
                }
            }
        })
        .collect()
}

async fn deliver_one(transport: Arc<dyn QueueTransport>, message: QueueMessage) -> Vec<DeliveryOutcome> {
    match transport.send_one(&message).await {
        Ok(receipt) => vec![DeliveryOutcome::Sent { message, receipt }],
        Err(e) => vec![DeliveryOutcome::WriteError {
            message,
            reason: e.to_string(),
        }],
    }
}

async fn deliver_batch(
    transport: Arc<dyn QueueTransport>,
    batch_id: Uuid,
    messages: Vec<QueueMessage>,
) -> Vec<DeliveryOutcome> {
    match transport.send_batch(&messages).await {
        Ok(response) => correlate_batch(messages, response),
        Err(e) => {
            tracing::warn!(%batch_id, entries = messages.len(), error = %e, "batch call failed");
            let reason = e.to_string();
            messages
                .into_iter()
                .map(|message| DeliveryOutcome::WriteError {
                    message,
                    reason: reason.clone(),
                })
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct DeliveryPipeline {
    transport: Arc<dyn QueueTransport>,
    codec: MessageCodec,
    cfg: DeliveryConfig,
    pending: Vec<QueueMessage>,
    in_flight: JoinSet<Vec<DeliveryOutcome>>,
    /// Copies of in-flight messages, resolved as write errors if a task dies.
    outstanding: HashMap<Id, Vec<QueueMessage>>,
    next_seq: u64,
}

impl DeliveryPipeline {
    pub fn new(transport: Arc<dyn QueueTransport>, codec: MessageCodec, cfg: DeliveryConfig) -> Self {
        Self {
            transport,
            codec,
            cfg: cfg.clamped(),
            pending: Vec::new(),
            in_flight: JoinSet::new(),
            outstanding: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.pending.is_empty()
    }

    /// Encode and hand over one event. Returns outcomes of calls that had to
    /// complete to make room (possibly none).
    pub async fn submit(&mut self, event: &Event) -> Vec<DeliveryOutcome> {
        self.next_seq += 1;
        let message = self.codec.encode(format!("m{}", self.next_seq), event);

        if self.is_idle() {
            self.spawn_one(message);
            return Vec::new();
        }

        self.pending.push(message);
        let mut done = Vec::new();
        if self.pending.len() >= self.cfg.max_batch_size {
            while self.in_flight.len() >= self.cfg.max_in_flight {
                match self.join_next().await {
                    Some(outcomes) => done.extend(outcomes),
                    None => break,
                }
            }
            self.spawn_batch();
        }
        done
    }

    /// Wait for the next in-flight call. Pending messages are dispatched as
    /// soon as a slot frees up. `None` once the pipeline is idle.
    pub async fn next_completed(&mut self) -> Option<Vec<DeliveryOutcome>> {
        if self.in_flight.is_empty() && !self.pending.is_empty() {
            self.spawn_batch();
        }
        let outcomes = self.join_next().await?;
        if !self.pending.is_empty() && self.in_flight.len() < self.cfg.max_in_flight {
            self.spawn_batch();
        }
        Some(outcomes)
    }

    /// Dispatch everything pending and wait for every call.
    pub async fn flush(&mut self) -> Vec<DeliveryOutcome> {
        let mut done = Vec::new();
        while let Some(outcomes) = self.next_completed().await {
            done.extend(outcomes);
        }
        done
    }

    /// Stop accepting work: wait for in-flight calls, hand back pending
    /// messages that were never dispatched.
    pub async fn abort(&mut self) -> (Vec<DeliveryOutcome>, Vec<QueueMessage>) {
        let unsent = std::mem::take(&mut self.pending);
        let mut done = Vec::new();
        while let Some(outcomes) = self.join_next().await {
            done.extend(outcomes);
        }
        (done, unsent)
    }

    fn spawn_one(&mut self, message: QueueMessage) {
        tracing::debug!(id = %message.id, key = %message.event.key, "send_one");
        let copy = vec![message.clone()];
        let handle = self
            .in_flight
            .spawn(deliver_one(Arc::clone(&self.transport), message));
        self.outstanding.insert(handle.id(), copy);
    }

    fn spawn_batch(&mut self) {
        let take = self.pending.len().min(self.cfg.max_batch_size);
        if take == 0 {
            return;
        }
        let batch: Vec<QueueMessage> = self.pending.drain(..take).collect();
        let batch_id = Uuid::new_v4();
        tracing::debug!(%batch_id, entries = batch.len(), "send_batch");
        let copy = batch.clone();
        let handle = self
            .in_flight
            .spawn(deliver_batch(Arc::clone(&self.transport), batch_id, batch));
        self.outstanding.insert(handle.id(), copy);
    }

    async fn join_next(&mut self) -> Option<Vec<DeliveryOutcome>> {
        match self.in_flight.join_next_with_id().await? {
            Ok((id, outcomes)) => {
                self.outstanding.remove(&id);
                Some(outcomes)
            }
            Err(e) => {
                tracing::error!(error = %e, "delivery task failed");
                let messages = self.outstanding.remove(&e.id()).unwrap_or_default();
                let reason = format!("delivery task failed: {e}");
                Some(
                    messages
                        .into_iter()
                        .map(|message| DeliveryOutcome::WriteError {
                            message,
                            reason: reason.clone(),
                        })
                        .collect(),
                )
            }
        }
    }
}
