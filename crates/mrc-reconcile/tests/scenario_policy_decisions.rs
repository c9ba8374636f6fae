//! Scenario: Policy Decisions
//!
//! # Invariants under test
//!
//! 1. A=[aa…1 x@x.com], B=[] → exactly one CREATE for aa…1.
//! 2. A=[], B=[bb…2 y@y.com] → exactly one DELETE for bb…2.
//! 3. A=[cc…3 new@x.com], B=[cc…3 old@x.com] → exactly one UPDATE carrying
//!    new@x.com.
//! 4. Base64-encoded primary fields are delivered decoded.
//! 5. Every event carries the run timestamp.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use mrc_reconcile::{
    Event, EventKind, FieldNormalizer, LineValidator, MemorySource, MergeJoin, ReconcilePolicy,
    Source,
};

const AA: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1";
const BB: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb2";
const CC: &str = "ccccccccccccccccccccccccccccccc3";

fn ts() -> DateTime<Utc> {
    Utc.timestamp_opt(1_526_936_236, 748_000_000).unwrap()
}

fn events(primary: &[[&str; 2]], secondary: &[[&str; 2]], policy: &ReconcilePolicy) -> Vec<Event> {
    let join = MergeJoin::new(
        MemorySource::from_rows(primary.iter().map(|r| r.to_vec())),
        LineValidator::new(Source::Primary, ["uid", "email"]),
        MemorySource::from_rows(secondary.iter().map(|r| r.to_vec())),
        LineValidator::new(Source::Secondary, ["uid", "email"]),
    );
    join.filter_map(|s| policy.decide(s.unwrap()).into_event())
        .collect()
}

#[test]
fn primary_only_is_create() {
    let evs = events(&[[AA, "x@x.com"]], &[], &ReconcilePolicy::new(ts()));
    assert_eq!(evs.len(), 1);
    assert_eq!(evs[0].kind, EventKind::Create);
    assert_eq!(evs[0].key, AA);
    assert_eq!(evs[0].field("email"), Some("x@x.com"));
    assert_eq!(evs[0].timestamp, ts());
}

#[test]
fn secondary_only_is_delete() {
    let evs = events(&[], &[[BB, "y@y.com"]], &ReconcilePolicy::new(ts()));
    assert_eq!(evs.len(), 1);
    assert_eq!(evs[0].kind, EventKind::Delete);
    assert_eq!(evs[0].key, BB);
    assert_eq!(evs[0].field("email"), Some("y@y.com"));
}

#[test]
fn changed_email_is_update_with_primary_value() {
    let evs = events(
        &[[CC, "new@x.com"]],
        &[[CC, "old@x.com"]],
        &ReconcilePolicy::new(ts()),
    );
    assert_eq!(evs.len(), 1);
    assert_eq!(evs[0].kind, EventKind::Update);
    assert_eq!(evs[0].key, CC);
    assert_eq!(evs[0].field("email"), Some("new@x.com"));
}

#[test]
fn encoded_primary_is_delivered_decoded() {
    let encoded = general_purpose::STANDARD.encode("Person@Example.org");
    let policy = ReconcilePolicy::new(ts())
        .with_primary_normalizer(FieldNormalizer::with_base64_fields(["email"]));

    let evs = events(&[[AA, encoded.as_str()]], &[], &policy);
    assert_eq!(evs[0].field("email"), Some("Person@Example.org"));

    let none = events(
        &[[AA, encoded.as_str()]],
        &[[AA, "person@example.org"]],
        &policy,
    );
    assert!(none.is_empty(), "case-only change must be ignored");
}
