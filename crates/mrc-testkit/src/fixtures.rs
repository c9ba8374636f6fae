//! Synthetic PRIMARY/SECONDARY feed pairs with known expected counts.
//!
//! Each generated key lands in exactly one bucket:
//!
//! | roll (0..100)                 | PRIMARY row          | SECONDARY row        | expected |
//! |-------------------------------|----------------------|----------------------|----------|
//! | `< pc`                        | `uid@primary.test`   | -                    | CREATE   |
//! | `< pc + pd`                   | -                    | `uid@secondary.test` | DELETE   |
//! | `< pc + pd + pu`              | `uid@changed.test`   | `uid@original.test`  | UPDATE   |
//! | otherwise                     | `uid@same.test`      | `uid@same.test`      | IGNORE   |
//!
//! Rows are written sorted by key. PRIMARY email and locale are base64
//! encoded, matching the default PRIMARY layout.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use mrc_ingest::split_line;
use mrc_reconcile::MemorySource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

const LOCALES: &[&str] = &[
    "en",
    "en-US",
    "fr",
    "de",
    "es",
    "es-ES",
    "es-AR",
    "en,en-US",
    "de-de,de,en,en-us,en-au,de-informal,fr-fr,fr,de-ch",
    "\u{00DE}",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixtureSpec {
    /// Distinct keys to generate.
    pub count: usize,
    pub pct_create: u8,
    pub pct_update: u8,
    pub pct_delete: u8,
    /// Fixed seed for a reproducible fixture.
    pub seed: Option<u64>,
    /// Value written to PRIMARY `createDate`.
    pub create_date_ms: i64,
}

impl Default for FixtureSpec {
    fn default() -> Self {
        Self {
            count: 100,
            pct_create: 10,
            pct_update: 5,
            pct_delete: 10,
            seed: None,
            create_date_ms: 1_473_453_024_553,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExpectedCounts {
    pub create: u64,
    pub update: u64,
    pub delete: u64,
    pub ignore: u64,
}

impl ExpectedCounts {
    pub fn actionable(&self) -> u64 {
        self.create + self.update + self.delete
    }

    pub fn total(&self) -> u64 {
        self.actionable() + self.ignore
    }
}

#[derive(Clone, Debug)]
pub struct Fixture {
    pub primary_lines: Vec<String>,
    pub secondary_lines: Vec<String>,
    pub expected: ExpectedCounts,
}

#[derive(Clone, Copy)]
enum Bucket {
    Create,
    Delete,
    Update,
    Ignore,
}

pub fn generate_fixture(spec: FixtureSpec) -> Fixture {
    let mut rng = match spec.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let create_max = u32::from(spec.pct_create);
    let delete_max = create_max + u32::from(spec.pct_delete);
    let update_max = delete_max + u32::from(spec.pct_update);

    let mut keys: BTreeMap<String, Bucket> = BTreeMap::new();
    while keys.len() < spec.count {
        let key = format!("{:032x}", rng.gen::<u128>());
        let roll = rng.gen_range(0..100u32);
        let bucket = if roll < create_max {
            Bucket::Create
        } else if roll < delete_max {
            Bucket::Delete
        } else if roll < update_max {
            Bucket::Update
        } else {
            Bucket::Ignore
        };
        keys.insert(key, bucket);
    }

    let mut fixture = Fixture {
        primary_lines: Vec::new(),
        secondary_lines: Vec::new(),
        expected: ExpectedCounts::default(),
    };
    for (i, (key, bucket)) in keys.iter().enumerate() {
        let locale = LOCALES[i % LOCALES.len()];
        let primary_row = |domain: &str| {
            format!(
                "{key},{},{},{}",
                b64(&format!("{key}@{domain}")),
                b64(locale),
                spec.create_date_ms
            )
        };
        let secondary_row = |domain: &str| format!("{key},{key}@{domain}");

        match bucket {
            Bucket::Create => {
                fixture.primary_lines.push(primary_row("primary.test"));
                fixture.expected.create += 1;
            }
            Bucket::Delete => {
                fixture.secondary_lines.push(secondary_row("secondary.test"));
                fixture.expected.delete += 1;
            }
            Bucket::Update => {
                fixture.primary_lines.push(primary_row("changed.test"));
                fixture.secondary_lines.push(secondary_row("original.test"));
                fixture.expected.update += 1;
            }
            Bucket::Ignore => {
                fixture.primary_lines.push(primary_row("same.test"));
                fixture.secondary_lines.push(secondary_row("same.test"));
                fixture.expected.ignore += 1;
            }
        }
    }
    fixture
}

fn b64(s: &str) -> String {
    general_purpose::STANDARD.encode(s)
}

impl Fixture {
    pub fn primary_source(&self) -> MemorySource {
        lines_to_source(&self.primary_lines)
    }

    pub fn secondary_source(&self) -> MemorySource {
        lines_to_source(&self.secondary_lines)
    }

    pub fn write_to(&self, primary: &Path, secondary: &Path) -> Result<()> {
        write_lines(primary, &self.primary_lines)?;
        write_lines(secondary, &self.secondary_lines)
    }
}

fn lines_to_source(lines: &[String]) -> MemorySource {
    MemorySource::from_rows(lines.iter().map(|l| split_line(l, ',')))
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    for line in lines {
        writeln!(w, "{line}").with_context(|| format!("write {}", path.display()))?;
    }
    w.flush()
        .with_context(|| format!("flush {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(count: usize, seed: u64) -> FixtureSpec {
        FixtureSpec {
            count,
            seed: Some(seed),
            ..FixtureSpec::default()
        }
    }

    #[test]
    fn same_seed_same_fixture() {
        let a = generate_fixture(spec(50, 7));
        let b = generate_fixture(spec(50, 7));
        assert_eq!(a.primary_lines, b.primary_lines);
        assert_eq!(a.secondary_lines, b.secondary_lines);
        assert_eq!(a.expected, b.expected);
    }

    #[test]
    fn rows_are_sorted_and_counts_add_up() {
        let f = generate_fixture(spec(500, 11));
        assert_eq!(f.expected.total(), 500);

        for lines in [&f.primary_lines, &f.secondary_lines] {
            let keys: Vec<&str> = lines.iter().map(|l| &l[..32]).collect();
            assert!(keys.windows(2).all(|w| w[0] < w[1]));
        }
        let e = f.expected;
        assert_eq!(f.primary_lines.len() as u64, e.create + e.update + e.ignore);
        assert_eq!(f.secondary_lines.len() as u64, e.delete + e.update + e.ignore);
    }

    #[test]
    fn hundred_percent_create_has_no_secondary_rows() {
        let f = generate_fixture(FixtureSpec {
            pct_create: 100,
            ..spec(20, 3)
        });
        assert_eq!(f.expected.create, 20);
        assert!(f.secondary_lines.is_empty());
    }
}
