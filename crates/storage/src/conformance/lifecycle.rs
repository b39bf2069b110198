//! Save and lock conformance tests.

use mrv_core::SubjectKey;

use super::{check, fixture_pair, TestResult};
use crate::{SnapshotState, SnapshotStore, StorageError};

pub(super) fn run_lifecycle_tests<S, F>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> S,
{
    let tests: [(&str, &str, fn(&S) -> Result<(), String>); 11] = [
        ("save", "save_assigns_increasing_ids", save_assigns_increasing_ids::<S>),
        ("save", "first_snapshot_has_no_previous", first_snapshot_has_no_previous::<S>),
        ("save", "saved_snapshot_is_draft", saved_snapshot_is_draft::<S>),
        ("save", "save_rejects_tampered_result", save_rejects_tampered_result::<S>),
        ("save", "save_rejects_foreign_result", save_rejects_foreign_result::<S>),
        ("save", "get_unknown_returns_not_found", get_unknown_returns_not_found::<S>),
        ("save", "latest_for_subject_returns_newest", latest_for_subject_returns_newest::<S>),
        ("lock", "lock_sets_locked_state", lock_sets_locked_state::<S>),
        ("lock", "lock_twice_is_rejected", lock_twice_is_rejected::<S>),
        ("lock", "replace_on_locked_is_rejected", replace_on_locked_is_rejected::<S>),
        ("lock", "delete_on_locked_is_rejected", delete_on_locked_is_rejected::<S>),
    ];
    tests
        .iter()
        .map(|(category, name, test)| TestResult::from_result(category, name, test(&factory())))
        .collect()
}

fn save_assigns_increasing_ids<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (i1, r1) = fixture_pair("P1", "F1", 1);
    let (i2, r2) = fixture_pair("P1", "F2", 2);
    let a = store.save(i1, r1).map_err(|e| e.to_string())?;
    let b = store.save(i2, r2).map_err(|e| e.to_string())?;
    check(b.id() > a.id(), format!("ids not increasing: {} then {}", a.id(), b.id()))
}

fn first_snapshot_has_no_previous<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (input, result) = fixture_pair("P1", "F1", 1);
    let snapshot = store.save(input, result).map_err(|e| e.to_string())?;
    check(
        snapshot.previous_snapshot_hash().is_none(),
        "first snapshot should not link to a predecessor",
    )
}

fn saved_snapshot_is_draft<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (input, result) = fixture_pair("P1", "F1", 1);
    let expected_input_hash = input.reproducibility_key().map_err(|e| e.to_string())?;
    let expected_result_hash = result.result_hash.clone();
    let snapshot = store.save(input, result).map_err(|e| e.to_string())?;
    check(*snapshot.state() == SnapshotState::Draft, "expected draft state")?;
    check(
        snapshot.input_hash() == expected_input_hash,
        "input_hash is not the reproducibility key",
    )?;
    check(
        snapshot.result_hash() == expected_result_hash,
        "result_hash differs from the bundle's",
    )?;
    let loaded = store.get(snapshot.id()).map_err(|e| e.to_string())?;
    check(loaded == snapshot, "get returned a different snapshot")
}

fn save_rejects_tampered_result<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (input, mut result) = fixture_pair("P1", "F1", 1);
    result.content.totals.facility_tco2e += rust_decimal::Decimal::ONE;
    match store.save(input, result) {
        Err(StorageError::ResultHashMismatch { .. }) => {}
        other => return Err(format!("expected ResultHashMismatch, got {:?}", other.map(|s| s.id()))),
    }
    let listed = store.list(None).map_err(|e| e.to_string())?;
    check(listed.is_empty(), "rejected save must not persist anything")
}

fn save_rejects_foreign_result<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (input, _) = fixture_pair("P1", "F1", 1);
    let (_, other_result) = fixture_pair("P1", "F1", 2);
    match store.save(input, other_result) {
        Err(StorageError::InputBundleMismatch { .. }) => Ok(()),
        other => Err(format!(
            "expected InputBundleMismatch, got {:?}",
            other.map(|s| s.id())
        )),
    }
}

fn get_unknown_returns_not_found<S: SnapshotStore>(store: &S) -> Result<(), String> {
    match store.get(999) {
        Err(StorageError::SnapshotNotFound { id: 999 }) => Ok(()),
        other => Err(format!("expected SnapshotNotFound, got {:?}", other.map(|s| s.id()))),
    }
}

fn latest_for_subject_returns_newest<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let subject = SubjectKey::new("P1", "F1");
    let none = store.latest_for_subject(&subject).map_err(|e| e.to_string())?;
    check(none.is_none(), "empty store should have no latest snapshot")?;

    for marker in 1..=3 {
        let (input, result) = fixture_pair("P1", "F1", marker);
        store.save(input, result).map_err(|e| e.to_string())?;
    }
    let (input, result) = fixture_pair("P2", "F1", 9);
    store.save(input, result).map_err(|e| e.to_string())?;

    let latest = store
        .latest_for_subject(&subject)
        .map_err(|e| e.to_string())?
        .ok_or("missing latest snapshot")?;
    check(
        latest.input().config["marker"] == 3,
        "latest snapshot is not the third save",
    )
}

fn lock_sets_locked_state<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (input, result) = fixture_pair("P1", "F1", 1);
    let saved = store.save(input, result).map_err(|e| e.to_string())?;
    let locked = store.lock(saved.id()).map_err(|e| e.to_string())?;
    check(locked.is_locked(), "lock did not set locked state")?;
    check(
        locked.snapshot_hash() == saved.snapshot_hash(),
        "locking must not change the snapshot hash",
    )?;
    let loaded = store.get(saved.id()).map_err(|e| e.to_string())?;
    check(loaded.is_locked(), "locked state not persisted")
}

fn lock_twice_is_rejected<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (input, result) = fixture_pair("P1", "F1", 1);
    let saved = store.save(input, result).map_err(|e| e.to_string())?;
    store.lock(saved.id()).map_err(|e| e.to_string())?;
    match store.lock(saved.id()) {
        Err(StorageError::SnapshotLocked { id, .. }) if id == saved.id() => Ok(()),
        other => Err(format!("expected SnapshotLocked, got {:?}", other.map(|s| s.id()))),
    }
}

fn replace_on_locked_is_rejected<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (input, result) = fixture_pair("P1", "F1", 1);
    let saved = store.save(input, result).map_err(|e| e.to_string())?;
    store.lock(saved.id()).map_err(|e| e.to_string())?;

    let (input, result) = fixture_pair("P1", "F1", 2);
    match store.replace_bundles(saved.id(), input, result) {
        Err(StorageError::SnapshotLocked { .. }) => {}
        other => return Err(format!("expected SnapshotLocked, got {:?}", other.map(|s| s.id()))),
    }
    let loaded = store.get(saved.id()).map_err(|e| e.to_string())?;
    check(
        loaded.result_hash() == saved.result_hash(),
        "locked snapshot content changed",
    )
}

fn delete_on_locked_is_rejected<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (input, result) = fixture_pair("P1", "F1", 1);
    let saved = store.save(input, result).map_err(|e| e.to_string())?;
    store.lock(saved.id()).map_err(|e| e.to_string())?;
    match store.delete(saved.id()) {
        Err(StorageError::SnapshotLocked { .. }) => {}
        other => return Err(format!("expected SnapshotLocked, got {:?}", other)),
    }
    store
        .get(saved.id())
        .map(|_| ())
        .map_err(|e| format!("locked snapshot disappeared: {}", e))
}
