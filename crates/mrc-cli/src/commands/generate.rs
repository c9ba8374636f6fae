//! `mrc generate`

use std::path::Path;

use anyhow::{bail, Context, Result};
use mrc_testkit::{generate_fixture, FixtureSpec};

pub fn run(
    count: usize,
    primary: &Path,
    secondary: &Path,
    pc: u8,
    pu: u8,
    pd: u8,
    seed: Option<u64>,
) -> Result<()> {
    let sum = u32::from(pc) + u32::from(pu) + u32::from(pd);
    if sum > 100 {
        bail!("--pc + --pu + --pd must not exceed 100, got {sum}");
    }

    let fixture = generate_fixture(FixtureSpec {
        count,
        pct_create: pc,
        pct_update: pu,
        pct_delete: pd,
        seed,
        ..FixtureSpec::default()
    });
    fixture.write_to(primary, secondary)?;

    tracing::info!(
        count,
        primary = %primary.display(),
        secondary = %secondary.display(),
        "fixture written"
    );
    let expected = serde_json::to_string_pretty(&fixture.expected).context("serialize counts")?;
    println!("{expected}");
    Ok(())
}
