//! Scenario: Sort Violation Is Fatal
//!
//! # Invariants under test
//!
//! 1. A regression on PRIMARY at position k yields no step for any record at
//!    or after k.
//! 2. A duplicate key on SECONDARY is fatal and names the source and key.
//! 3. After the fatal error the engine stays halted (Done on every call).
//! 4. A malformed key is NOT fatal: the line is skipped and reported.
//!
//! Pure in-process.

use mrc_reconcile::{FatalError, LineValidator, MemorySource, MergeJoin, MergeStep, Source};

fn key(n: u8) -> String {
    format!("{:032x}", n)
}

fn join(primary: Vec<String>, secondary: Vec<String>) -> MergeJoin<MemorySource, MemorySource> {
    MergeJoin::new(
        MemorySource::from_rows(primary.into_iter().map(|k| vec![k])),
        LineValidator::new(Source::Primary, ["uid"]),
        MemorySource::from_rows(secondary.into_iter().map(|k| vec![k])),
        LineValidator::new(Source::Secondary, ["uid"]),
    )
}

#[test]
fn regression_halts_before_later_records() {
    // k = 3rd primary line (key 2 after key 5).
    let mut j = join(
        vec![key(1), key(5), key(2), key(9)],
        vec![key(3), key(4), key(6)],
    );

    let mut seen = Vec::new();
    let err = loop {
        match j.next_step() {
            Ok(Some(step)) => seen.push(step.key().to_string()),
            Ok(None) => panic!("expected a fatal error before Done"),
            Err(e) => break e,
        }
    };

    assert_eq!(err.feed(), Some(Source::Primary));
    assert_eq!(err.key(), key(2));
    assert!(matches!(err, FatalError::OutOfOrder(_)));
    assert!(err.to_string().contains("incorrectly sorted"));

    // Everything before the bad line is emitted in order; key(6) is the
    // pending secondary record and key(9) is past the violation.
    assert_eq!(seen, vec![key(1), key(3), key(4), key(5)]);

    assert_eq!(j.next_step().unwrap(), None);
    assert!(j.next().is_none());
}

#[test]
fn duplicate_on_secondary_is_fatal() {
    let mut j = join(vec![], vec![key(1), key(1)]);
    assert!(matches!(j.next_step(), Ok(Some(MergeStep::Right(_)))));
    match j.next_step() {
        Err(FatalError::OutOfOrder(v)) => {
            assert_eq!(v.source, Source::Secondary);
            assert_eq!(v.key, key(1));
            assert_eq!(v.previous, key(1));
            assert_eq!(v.line_no, 2);
        }
        other => panic!("expected duplicate violation, got {:?}", other),
    }
}

#[test]
fn malformed_key_is_skipped_not_fatal() {
    let mut j = join(
        vec![key(1), "NOT-A-KEY".to_string(), key(2)],
        vec![],
    );

    let steps: Vec<String> = j
        .by_ref()
        .map(|s| s.unwrap().key().to_string())
        .collect();
    assert_eq!(steps, vec![key(1), key(2)]);

    let rejected: Vec<_> = j.drain_rejections().collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].source, Source::Primary);
    assert_eq!(rejected[0].raw_key, "NOT-A-KEY");
    assert_eq!(rejected[0].line_no, 2);
}
