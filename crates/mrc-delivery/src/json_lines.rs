//! Writes each event as one JSON line instead of enqueueing it.
//!
//! The output can be replayed later through the same pipeline.

use std::io::Write;
use std::sync::Mutex;

use mrc_ingest::write_event_line;

use crate::{
    BatchFailure, BatchResponse, BatchSuccess, QueueMessage, QueueTransport, SendReceipt,
    TransportError,
};

pub struct JsonLinesTransport {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesTransport {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn write(&self, message: &QueueMessage) -> Result<String, TransportError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| TransportError::Io("output lock poisoned".to_string()))?;
        write_event_line(&mut *out, &message.event)
            .and_then(|_| out.flush())
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(format!("jsonl:{}", message.id))
    }
}

#[async_trait::async_trait]
impl QueueTransport for JsonLinesTransport {
    fn name(&self) -> &'static str {
        "json-lines"
    }

    async fn send_one(&self, message: &QueueMessage) -> Result<SendReceipt, TransportError> {
        let message_id = self.write(message)?;
        Ok(SendReceipt { message_id })
    }

    async fn send_batch(&self, messages: &[QueueMessage]) -> Result<BatchResponse, TransportError> {
        let mut resp = BatchResponse::default();
        for m in messages {
            match self.write(m) {
                Ok(message_id) => resp.successful.push(BatchSuccess {
                    id: m.id.clone(),
                    message_id,
                }),
                Err(e) => resp.failed.push(BatchFailure {
                    id: m.id.clone(),
                    reason: e.to_string(),
                    sender_fault: false,
                }),
            }
        }
        Ok(resp)
    }
}
