//! Leading-nibble histogram over actionable keys.
//!
//! Used as a sanity check that the touched keys are spread evenly: random
//! hex keys should land roughly uniformly across the 16 buckets.
//!
//! # Invariants
//!
//! - Exactly 16 buckets, `0-9a-f`; a key with any other leading character is
//!   counted in the anomaly bucket and never in the 16.
//! - `summarize` uses population statistics over the 16 bucket counts and
//!   rounds each figure to 2 decimal places.

use std::fmt;

use serde::{Serialize, Serializer};

pub const NIBBLES: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketHistogram {
    counts: [u64; 16],
    anomalies: u64,
}

impl BucketHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `key` in its leading-nibble bucket. Returns `false` (and counts
    /// an anomaly) when the leading character is not a lowercase hex digit.
    pub fn record(&mut self, key: &str) -> bool {
        match key.chars().next().and_then(bucket_index) {
            Some(i) => {
                self.counts[i] += 1;
                true
            }
            None => {
                self.anomalies += 1;
                tracing::warn!(key, "key does not start with a bucket nibble (0-9a-f)");
                false
            }
        }
    }

    pub fn count(&self, nibble: char) -> Option<u64> {
        bucket_index(nibble).map(|i| self.counts[i])
    }

    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    pub fn summarize(&self) -> BucketStats {
        let n = self.counts.len() as f64;
        let sum: u64 = self.counts.iter().sum();
        let mean = sum as f64 / n;
        let variance = self
            .counts
            .iter()
            .map(|&c| (c as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        BucketStats {
            sum: round2(sum as f64),
            mean: round2(mean),
            stddev: round2(variance.sqrt()),
        }
    }
}

fn bucket_index(c: char) -> Option<usize> {
    match c {
        '0'..='9' | 'a'..='f' => c.to_digit(16).map(|d| d as usize),
        _ => None,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Distribution summary, each figure rounded to 2 decimals.
///
/// Serializes as fixed 2-decimal strings (`"16.00"`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BucketStats {
    #[serde(serialize_with = "two_places")]
    pub sum: f64,
    #[serde(serialize_with = "two_places")]
    pub mean: f64,
    #[serde(serialize_with = "two_places")]
    pub stddev: f64,
}

fn two_places<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:.2}", v))
}

impl fmt::Display for BucketStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sum={:.2} mean={:.2} stddev={:.2}",
            self.sum, self.mean, self.stddev
        )
    }
}
