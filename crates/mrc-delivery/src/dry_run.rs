//! Simulated transport for dry runs.
//!
//! Nothing leaves the process. Each message independently fails with
//! probability `failure_rate`, so the write-error path is exercised with the
//! same signal contract as a real queue. A seed makes the failure pattern
//! reproducible.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    BatchFailure, BatchResponse, BatchSuccess, QueueMessage, QueueTransport, SendReceipt,
    TransportError,
};

const SIMULATED_FAILURE: &str = "simulated failure";

pub struct DryRunTransport {
    failure_rate: f64,
    rng: Mutex<StdRng>,
    accepted: AtomicU64,
}

impl DryRunTransport {
    /// `failure_rate` is clamped to `[0, 1]`.
    pub fn new(failure_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let failure_rate = if failure_rate.is_finite() {
            failure_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            failure_rate,
            rng: Mutex::new(rng),
            accepted: AtomicU64::new(0),
        }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    /// Messages accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    fn should_fail(&self) -> bool {
        if self.failure_rate <= 0.0 {
            return false;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_bool(self.failure_rate),
            Err(poisoned) => poisoned.into_inner().gen_bool(self.failure_rate),
        }
    }

    fn accept(&self, message: &QueueMessage) -> String {
        let n = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(id = %message.id, key = %message.event.key, "dry-run accept");
        format!("dry-run:{n}")
    }
}

#[async_trait::async_trait]
impl QueueTransport for DryRunTransport {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn send_one(&self, message: &QueueMessage) -> Result<SendReceipt, TransportError> {
        if self.should_fail() {
            return Err(TransportError::Rejected(SIMULATED_FAILURE.to_string()));
        }
        Ok(SendReceipt {
            message_id: self.accept(message),
        })
    }

    async fn send_batch(&self, messages: &[QueueMessage]) -> Result<BatchResponse, TransportError> {
        let mut resp = BatchResponse::default();
        for m in messages {
            if self.should_fail() {
                resp.failed.push(BatchFailure {
                    id: m.id.clone(),
                    reason: SIMULATED_FAILURE.to_string(),
                    sender_fault: false,
                });
            } else {
                resp.successful.push(BatchSuccess {
                    id: m.id.clone(),
                    message_id: self.accept(m),
                });
            }
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageCodec;
    use chrono::{TimeZone, Utc};
    use mrc_reconcile::{Event, EventKind, Record, Source};

    fn messages(n: usize) -> Vec<QueueMessage> {
        (0..n)
            .map(|i| {
                let ev = Event::new(
                    EventKind::Delete,
                    Record::new(format!("{:032x}", i), Source::Secondary),
                    Utc.timestamp_opt(0, 0).unwrap(),
                );
                MessageCodec::default().encode(format!("m{i}"), &ev)
            })
            .collect()
    }

    #[tokio::test]
    async fn zero_rate_never_fails() {
        let t = DryRunTransport::new(0.0, None);
        let resp = t.send_batch(&messages(10)).await.unwrap();
        assert_eq!(resp.successful.len(), 10);
        assert!(resp.failed.is_empty());
        assert_eq!(t.accepted(), 10);
    }

    #[tokio::test]
    async fn full_rate_always_fails() {
        let t = DryRunTransport::new(7.0, None);
        assert_eq!(t.failure_rate(), 1.0);
        assert!(t.send_one(&messages(1)[0]).await.is_err());
        let resp = t.send_batch(&messages(4)).await.unwrap();
        assert_eq!(resp.failed.len(), 4);
    }

    #[tokio::test]
    async fn seeded_failures_are_reproducible() {
        let a = DryRunTransport::new(0.3, Some(42));
        let b = DryRunTransport::new(0.3, Some(42));
        let ra = a.send_batch(&messages(10)).await.unwrap();
        let rb = b.send_batch(&messages(10)).await.unwrap();
        assert_eq!(ra, rb);
        assert_eq!(ra.successful.len() + ra.failed.len(), 10);
    }
}
