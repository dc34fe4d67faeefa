//! Stream-level matcher behavior: pairing across uneven logs, degenerate
//! records, orphans, early stream ends and poisoning.

use chrono::{NaiveDate, NaiveDateTime};

use callcheck_core::codec::{serialize_callee, serialize_caller};
use callcheck_core::domain::record::{CalleeRecord, CallerRecord, Party};
use callcheck_core::matcher::{CausalMatcher, MatchedPair};

fn at(min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2007, 2, 14)
        .unwrap()
        .and_hms_opt(10, min, s)
        .unwrap()
}

fn caller_record(connect: Option<NaiveDateTime>, release: Option<NaiveDateTime>) -> CallerRecord {
    let mut record = CallerRecord::default();
    record.obs.connect_time = connect;
    record.obs.release_time = release;
    record
}

fn callee_record(connect: Option<NaiveDateTime>, release: Option<NaiveDateTime>) -> CalleeRecord {
    let mut record = CalleeRecord::default();
    record.obs.connect_time = connect;
    record.obs.release_time = release;
    record
}

fn caller_log(records: &[CallerRecord]) -> Vec<u8> {
    let mut log = String::new();
    for record in records {
        log.push_str(&serialize_caller(record));
        log.push('\n');
    }
    log.into_bytes()
}

fn callee_log(records: &[CalleeRecord]) -> Vec<u8> {
    let mut log = String::new();
    for record in records {
        log.push_str(&serialize_callee(record));
        log.push('\n');
    }
    log.into_bytes()
}

fn pairs_of(caller: Vec<u8>, callee: Vec<u8>) -> (Vec<MatchedPair>, Vec<String>) {
    let mut matcher = CausalMatcher::new(&caller[..], &callee[..]);
    let mut pairs = Vec::new();
    while let Some(pair) = matcher.next_pair() {
        pairs.push(pair);
    }
    let faults = matcher
        .faults()
        .iter()
        .map(|f| f.to_string())
        .collect();
    (pairs, faults)
}

// ── well-formed streams ─────────────────────────────────────────────────

#[test]
fn aligned_logs_pair_line_by_line() {
    let caller = caller_log(&[
        caller_record(Some(at(0, 0)), Some(at(0, 30))),
        caller_record(Some(at(1, 0)), Some(at(1, 30))),
    ]);
    let callee = callee_log(&[
        callee_record(Some(at(0, 1)), Some(at(0, 29))),
        callee_record(Some(at(1, 1)), Some(at(1, 29))),
    ]);

    let (pairs, faults) = pairs_of(caller, callee);
    assert!(faults.is_empty());
    assert_eq!(pairs.len(), 2);
    assert!(pairs.iter().all(|p| p.genuine));
    assert_eq!(pairs[0].caller_line, Some(1));
    assert_eq!(pairs[0].callee_line, Some(1));
    assert_eq!(pairs[1].caller_line, Some(2));
    assert_eq!(pairs[1].callee_line, Some(2));
}

#[test]
fn both_connects_unset_match_as_garbage_pair() {
    let caller = caller_log(&[caller_record(None, None)]);
    let callee = callee_log(&[callee_record(None, None)]);

    let (pairs, _) = pairs_of(caller, callee);
    assert_eq!(pairs.len(), 1);
    assert!(pairs[0].genuine);
}

// ── degenerate and orphaned records ─────────────────────────────────────

#[test]
fn unset_caller_connect_pairs_callee_with_synthetic_partner() {
    // The degenerate caller record stays pending and later matches the
    // second callee record as garbage-on-garbage... except the second
    // callee here is well-formed, so it overlaps nothing and the caller
    // drains at callee exhaustion.
    let caller = caller_log(&[caller_record(None, None)]);
    let callee = callee_log(&[callee_record(Some(at(0, 1)), Some(at(0, 29)))]);

    let (pairs, _) = pairs_of(caller, callee);
    assert_eq!(pairs.len(), 2);
    // First: the well-formed callee against a synthetic caller.
    assert!(!pairs[0].genuine);
    assert_eq!(pairs[0].caller_line, None);
    assert_eq!(pairs[0].callee_line, Some(1));
    // Then the degenerate caller drains against a synthetic callee.
    assert!(!pairs[1].genuine);
    assert_eq!(pairs[1].caller_line, Some(1));
    assert_eq!(pairs[1].callee_line, None);
}

#[test]
fn callee_entirely_after_caller_release_orphans_the_caller() {
    // Caller's call is [0:00, 0:30); callee's starts at 0:30.
    let caller = caller_log(&[
        caller_record(Some(at(0, 0)), Some(at(0, 30))),
        caller_record(Some(at(0, 30)), Some(at(1, 0))),
    ]);
    let callee = callee_log(&[callee_record(Some(at(0, 30)), Some(at(0, 59)))]);

    let (pairs, _) = pairs_of(caller, callee);
    assert_eq!(pairs.len(), 2);
    // First caller emitted with a synthetic callee; the callee record is
    // retried and genuinely matches the second caller.
    assert!(!pairs[0].genuine);
    assert_eq!(pairs[0].caller_line, Some(1));
    assert_eq!(pairs[0].callee_line, None);
    assert!(pairs[1].genuine);
    assert_eq!(pairs[1].caller_line, Some(2));
    assert_eq!(pairs[1].callee_line, Some(1));
}

#[test]
fn callee_entirely_before_caller_is_discarded() {
    // The stale callee record released before the caller's call began.
    let caller = caller_log(&[caller_record(Some(at(1, 0)), Some(at(1, 30)))]);
    let callee = callee_log(&[
        callee_record(Some(at(0, 0)), Some(at(0, 30))),
        callee_record(Some(at(1, 1)), Some(at(1, 29))),
    ]);

    let (pairs, _) = pairs_of(caller, callee);
    assert_eq!(pairs.len(), 1);
    assert!(pairs[0].genuine);
    assert_eq!(pairs[0].callee_line, Some(2));
}

// ── uneven stream ends ──────────────────────────────────────────────────

#[test]
fn callee_exhaustion_drains_remaining_callers_synthetically() {
    let caller = caller_log(&[
        caller_record(Some(at(0, 0)), Some(at(0, 30))),
        caller_record(Some(at(1, 0)), Some(at(1, 30))),
        caller_record(Some(at(2, 0)), Some(at(2, 30))),
    ]);
    let callee = callee_log(&[callee_record(Some(at(0, 1)), Some(at(0, 29)))]);

    let (pairs, faults) = pairs_of(caller, callee);
    assert!(faults.is_empty());
    assert_eq!(pairs.len(), 3);
    assert!(pairs[0].genuine);
    assert!(!pairs[1].genuine && pairs[1].callee_line.is_none());
    assert!(!pairs[2].genuine && pairs[2].callee_line.is_none());
}

#[test]
fn caller_exhaustion_discards_remaining_callees() {
    let caller = caller_log(&[caller_record(Some(at(0, 0)), Some(at(0, 30)))]);
    let callee = callee_log(&[
        callee_record(Some(at(0, 1)), Some(at(0, 29))),
        callee_record(Some(at(1, 1)), Some(at(1, 29))),
    ]);

    let (pairs, faults) = pairs_of(caller, callee);
    assert!(faults.is_empty());
    assert_eq!(pairs.len(), 1);
    assert!(pairs[0].genuine);
}

// ── poisoning ───────────────────────────────────────────────────────────

#[test]
fn malformed_caller_line_poisons_and_drains_the_callee_stream() {
    let mut caller = caller_log(&[caller_record(Some(at(0, 0)), Some(at(0, 30)))]);
    caller.extend_from_slice(b"this is not a record\n");
    let callee = callee_log(&[
        callee_record(Some(at(0, 1)), Some(at(0, 29))),
        callee_record(Some(at(1, 1)), Some(at(1, 29))),
    ]);

    let (pairs, faults) = pairs_of(caller, callee);
    assert_eq!(pairs.len(), 2);
    assert!(pairs[0].genuine);
    // The surviving callee record gets a synthetic caller instead of being
    // silently dropped.
    assert!(!pairs[1].genuine);
    assert_eq!(pairs[1].caller_line, None);
    assert_eq!(pairs[1].callee_line, Some(2));

    assert_eq!(faults.len(), 1);
    assert!(faults[0].contains("Caller log line 2"));
}

#[test]
fn malformed_callee_line_reports_the_party_and_line() {
    let caller = caller_log(&[
        caller_record(Some(at(0, 0)), Some(at(0, 30))),
        caller_record(Some(at(1, 0)), Some(at(1, 30))),
    ]);
    let mut callee = callee_log(&[callee_record(Some(at(0, 1)), Some(at(0, 29)))]);
    callee.extend_from_slice(b"garbage\t\t\n");

    let mut matcher = CausalMatcher::new(&caller[..], &callee[..]);
    let mut pairs = Vec::new();
    while let Some(pair) = matcher.next_pair() {
        pairs.push(pair);
    }

    assert_eq!(pairs.len(), 2);
    assert!(pairs[0].genuine);
    assert!(!pairs[1].genuine && pairs[1].callee_line.is_none());

    let faults = matcher.into_faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].party, Party::Callee);
    assert_eq!(faults[0].line, 2);
}
