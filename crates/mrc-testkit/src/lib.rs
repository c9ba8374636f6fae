//! Test support: synthetic feeds, an in-process transport that records its
//! calls, a reporter that collects every signal, and a harness that runs a
//! fixture through the real coordinator.

pub mod fixtures;
pub mod harness;
mod recording;

pub use fixtures::{generate_fixture, ExpectedCounts, Fixture, FixtureSpec};
pub use harness::{fixed_timestamp, fixture_policy, run_fixture, FixtureRun};
pub use recording::{CollectingReporter, RecordingTransport, TransportCall};
