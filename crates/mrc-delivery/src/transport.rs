//! Transport boundary.
//!
//! This module defines **only** the transport trait and its request/response
//! types. No batching, no retry and no counting belong here.

use std::fmt;

use crate::QueueMessage;

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    /// Identifier assigned by the queue.
    pub message_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchSuccess {
    /// Entry id as submitted ([`QueueMessage::id`]).
    pub id: String,
    pub message_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchFailure {
    /// Entry id as submitted ([`QueueMessage::id`]).
    pub id: String,
    pub reason: String,
    /// `true` when the queue blames the request rather than itself.
    pub sender_fault: bool,
}

/// Per-entry result of a batch call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchResponse {
    pub successful: Vec<BatchSuccess>,
    pub failed: Vec<BatchFailure>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A whole call failed. For batches, every entry of the call failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, TLS or timeout failure.
    Network(String),
    /// Non-success HTTP status.
    Status { status: u16, message: String },
    /// Response could not be decoded.
    Decode(String),
    /// Local write failure (stdout transport).
    Io(String),
    /// The transport refused the message (including simulated failures).
    Rejected(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(m) => write!(f, "network error: {m}"),
            TransportError::Status { status, message } => {
                write!(f, "queue returned status {status}: {message}")
            }
            TransportError::Decode(m) => write!(f, "response decode failed: {m}"),
            TransportError::Io(m) => write!(f, "write failed: {m}"),
            TransportError::Rejected(m) => write!(f, "rejected: {m}"),
        }
    }
}

impl std::error::Error for TransportError {}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Queue transport.
///
/// `send_batch` receives at most [`MAX_BATCH_SIZE`](crate::MAX_BATCH_SIZE)
/// messages whose ids are unique within the call.
#[async_trait::async_trait]
pub trait QueueTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_one(&self, message: &QueueMessage) -> Result<SendReceipt, TransportError>;

    async fn send_batch(&self, messages: &[QueueMessage]) -> Result<BatchResponse, TransportError>;
}
