//! mrc-delivery
//!
//! Outbound half of a run: events are encoded into queue messages and
//! delivered one at a time or in batches of at most [`MAX_BATCH_SIZE`].
//!
//! Architectural decisions:
//! - Every submitted event resolves to exactly one `Sent` or `WriteError`
//! - Partial batch failure is per entry, never all-or-nothing
//! - No automatic retry
//! - Transports are swappable behind [`QueueTransport`]: dry-run (simulated
//!   failures), JSON lines (stdout), SQS-style HTTP
//!
//! The pipeline is owned by a single control loop; completions are pulled by
//! that loop, so counters fed from outcomes never race.

mod dry_run;
mod http;
mod json_lines;
mod message;
mod pipeline;
mod transport;

pub use dry_run::DryRunTransport;
pub use http::SqsHttpTransport;
pub use json_lines::JsonLinesTransport;
pub use message::{MessageAttribute, MessageCodec, QueueMessage};
pub use pipeline::{correlate_batch, DeliveryConfig, DeliveryOutcome, DeliveryPipeline, MAX_BATCH_SIZE};
pub use transport::{BatchFailure, BatchResponse, BatchSuccess, QueueTransport, SendReceipt, TransportError};
