//! Scenario: CLI Mirror Maintenance and Diff
//!
//! # Invariants under test
//!
//! 1. `prune-deleted --output` writes the mirror without deleted keys and
//!    reports delete / not-deleted / not-in-mirror counts.
//! 2. `update-emails` rewrites changed emails and skips equal ones; without
//!    `--output` the new mirror goes to stdout.
//! 3. `--dry-run` counts but writes nothing.
//! 4. An unsorted mirror exits 1 and never produces the final output file.
//! 5. `reconcile-diff --jsonout` emits the diff's events with the given
//!    timestamp; a malformed diff exits 1.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn mrc() -> Command {
    let mut cmd = Command::cargo_bin("mrc").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn key(n: u32) -> String {
    format!("{:032x}", n)
}

fn stderr_json(stderr: &[u8]) -> Value {
    // The report is the last pretty-printed JSON object on stderr.
    let text = String::from_utf8_lossy(stderr);
    let start = text.rfind("\n{").map(|i| i + 1).unwrap_or(0);
    let end = text.rfind('}').unwrap() + 1;
    serde_json::from_str(&text[start..end]).unwrap()
}

#[test]
fn prune_deleted_writes_remaining_rows() {
    let dir = tempfile::tempdir().unwrap();
    let deleted = dir.path().join("deleted.csv");
    let mirror = dir.path().join("mirror.csv");
    let output = dir.path().join("new.csv");
    std::fs::write(&deleted, format!("{},b@x.com\n{},z@x.com\n", key(2), key(8))).unwrap();
    std::fs::write(
        &mirror,
        format!("{},a@x.com\n{},b@x.com\n{},c@x.com\n", key(1), key(2), key(3)),
    )
    .unwrap();

    let out = mrc()
        .arg("prune-deleted")
        .arg("--deleted")
        .arg(&deleted)
        .arg("--mirror")
        .arg(&mirror)
        .arg("--output")
        .arg(&output)
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        format!("{},a@x.com\n{},c@x.com\n", key(1), key(3))
    );
    let report = stderr_json(&out.stderr);
    assert_eq!(report["policy"], "remove-deleted");
    assert_eq!(report["counts"]["deleted"], 1);
    assert_eq!(report["counts"]["not_deleted"], 2);
    assert_eq!(report["counts"]["not_in_mirror"], 1);
    assert_eq!(report["total_mirror"], 3);
    assert_eq!(report["total_feed"], 2);
}

#[test]
fn update_emails_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let updates = dir.path().join("updates.csv");
    let mirror = dir.path().join("mirror.csv");
    std::fs::write(&updates, format!("{},new@x.com\n{},same@x.com\n", key(1), key(2))).unwrap();
    std::fs::write(
        &mirror,
        format!("{},old@x.com\n{},same@x.com\n{},d@x.com\n", key(1), key(2), key(4)),
    )
    .unwrap();

    let out = mrc()
        .arg("update-emails")
        .arg("--updates")
        .arg(&updates)
        .arg("--mirror")
        .arg(&mirror)
        .output()
        .unwrap();
    assert!(out.status.success());

    assert_eq!(
        String::from_utf8(out.stdout).unwrap(),
        format!("{},new@x.com\n{},d@x.com\n", key(1), key(4))
    );
    let report = stderr_json(&out.stderr);
    assert_eq!(report["counts"]["updated"], 1);
    assert_eq!(report["counts"]["already_equal"], 1);
    assert_eq!(report["counts"]["mirror_only"], 1);
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let deleted = dir.path().join("deleted.csv");
    let mirror = dir.path().join("mirror.csv");
    std::fs::write(&deleted, format!("{},a@x.com\n", key(1))).unwrap();
    std::fs::write(&mirror, format!("{},a@x.com\n{},b@x.com\n", key(1), key(2))).unwrap();

    mrc()
        .args(["prune-deleted", "--dry-run"])
        .arg("--deleted")
        .arg(&deleted)
        .arg("--mirror")
        .arg(&mirror)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("\"deleted\": 1"));
}

#[test]
fn unsorted_mirror_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let deleted = dir.path().join("deleted.csv");
    let mirror = dir.path().join("mirror.csv");
    let output = dir.path().join("new.csv");
    std::fs::write(&deleted, "").unwrap();
    std::fs::write(&mirror, format!("{},b@x.com\n{},a@x.com\n", key(2), key(1))).unwrap();

    mrc()
        .arg("prune-deleted")
        .arg("--deleted")
        .arg(&deleted)
        .arg("--mirror")
        .arg(&mirror)
        .arg("--output")
        .arg(&output)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("FATAL"));

    assert!(!output.exists());
    assert!(dir.path().join("new.csv.partial").exists());
}

#[test]
fn reconcile_diff_emits_diff_events() {
    let dir = tempfile::tempdir().unwrap();
    let diff = dir.path().join("changes.diff");
    std::fs::write(
        &diff,
        format!(
            "--- old.csv\n+++ new.csv\n@@ -1,3 +1,3 @@\n {k1},a@x.com\n-{k2},old@x.com\n+{k2},new@x.com\n-{k3},gone@x.com\n+{k4},fresh@x.com\n",
            k1 = key(1),
            k2 = key(2),
            k3 = key(3),
            k4 = key(4)
        ),
    )
    .unwrap();

    let out = mrc()
        .args(["reconcile-diff", "--jsonout", "--ts", "1526936236"])
        .arg("--input")
        .arg(&diff)
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let lines: Vec<Value> = String::from_utf8(out.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let events: Vec<(String, String)> = lines
        .iter()
        .map(|l| (l["event"].as_str().unwrap().to_string(), l["uid"].as_str().unwrap().to_string()))
        .collect();
    assert_eq!(
        events,
        vec![
            ("verified".to_string(), key(4)),
            ("primaryEmailChanged".to_string(), key(2)),
            ("delete".to_string(), key(3)),
        ]
    );
    assert!(lines.iter().all(|l| l["ts"].as_f64() == Some(1_526_936_236.0)));
}

#[test]
fn malformed_diff_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let diff = dir.path().join("changes.diff");
    std::fs::write(&diff, format!("@@ -1 +1 @@\n+{},a@x.com\n!oops\n", key(1))).unwrap();

    mrc()
        .args(["reconcile-diff", "--ts", "0"])
        .arg("--input")
        .arg(&diff)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("FATAL: event input"));
}
