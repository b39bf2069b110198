//! Hash-chain conformance tests.

use mrv_core::SubjectKey;

use super::{check, fixture_pair, TestResult};
use crate::{SnapshotStore, StorageError};

pub(super) fn run_chain_tests<S, F>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> S,
{
    let tests: [(&str, fn(&S) -> Result<(), String>); 6] = [
        ("save_links_previous_of_same_subject", save_links_previous_of_same_subject::<S>),
        ("subjects_have_independent_chains", subjects_have_independent_chains::<S>),
        ("replace_head_draft_keeps_chain_intact", replace_head_draft_keeps_chain_intact::<S>),
        ("replace_superseded_is_rejected", replace_superseded_is_rejected::<S>),
        ("delete_head_draft_then_save_relinks", delete_head_draft_then_save_relinks::<S>),
        ("delete_superseded_is_rejected", delete_superseded_is_rejected::<S>),
    ];
    tests
        .iter()
        .map(|(name, test)| TestResult::from_result("chain", name, test(&factory())))
        .collect()
}

fn save_links_previous_of_same_subject<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (i1, r1) = fixture_pair("P1", "F1", 1);
    let (i2, r2) = fixture_pair("P1", "F1", 2);
    let first = store.save(i1, r1).map_err(|e| e.to_string())?;
    let second = store.save(i2, r2).map_err(|e| e.to_string())?;
    check(
        second.previous_snapshot_hash() == Some(first.snapshot_hash()),
        "second snapshot does not link to the first",
    )?;
    let report = store
        .verify_chain(&SubjectKey::new("P1", "F1"))
        .map_err(|e| e.to_string())?;
    check(report.length == 2, format!("chain length {}", report.length))?;
    check(report.is_intact(), format!("chain broken: {:?}", report.broken))?;
    check(
        report.head.as_deref() == Some(second.snapshot_hash()),
        "chain head is not the newest snapshot",
    )
}

fn subjects_have_independent_chains<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (i1, r1) = fixture_pair("P1", "F1", 1);
    let (i2, r2) = fixture_pair("P1", "F2", 2);
    store.save(i1, r1).map_err(|e| e.to_string())?;
    let other = store.save(i2, r2).map_err(|e| e.to_string())?;
    check(
        other.previous_snapshot_hash().is_none(),
        "a different facility must start its own chain",
    )?;
    let listed = store
        .list(Some(&SubjectKey::new("P1", "F2")))
        .map_err(|e| e.to_string())?;
    check(listed.len() == 1, format!("expected 1 snapshot, got {}", listed.len()))
}

fn replace_head_draft_keeps_chain_intact<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (i1, r1) = fixture_pair("P1", "F1", 1);
    let (i2, r2) = fixture_pair("P1", "F1", 2);
    store.save(i1, r1).map_err(|e| e.to_string())?;
    let head = store.save(i2, r2).map_err(|e| e.to_string())?;

    let (i3, r3) = fixture_pair("P1", "F1", 3);
    let replaced = store
        .replace_bundles(head.id(), i3, r3)
        .map_err(|e| e.to_string())?;
    check(
        replaced.result_hash() != head.result_hash(),
        "replacement did not change the result hash",
    )?;
    let report = store
        .verify_chain(&SubjectKey::new("P1", "F1"))
        .map_err(|e| e.to_string())?;
    check(report.is_intact(), format!("chain broken: {:?}", report.broken))
}

fn replace_superseded_is_rejected<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (i1, r1) = fixture_pair("P1", "F1", 1);
    let (i2, r2) = fixture_pair("P1", "F1", 2);
    let first = store.save(i1, r1).map_err(|e| e.to_string())?;
    let second = store.save(i2, r2).map_err(|e| e.to_string())?;

    let (i3, r3) = fixture_pair("P1", "F1", 3);
    match store.replace_bundles(first.id(), i3, r3) {
        Err(StorageError::Superseded { id, successor })
            if id == first.id() && successor == second.id() =>
        {
            Ok(())
        }
        other => Err(format!("expected Superseded, got {:?}", other.map(|s| s.id()))),
    }
}

fn delete_head_draft_then_save_relinks<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (i1, r1) = fixture_pair("P1", "F1", 1);
    let (i2, r2) = fixture_pair("P1", "F1", 2);
    let first = store.save(i1, r1).map_err(|e| e.to_string())?;
    let second = store.save(i2, r2).map_err(|e| e.to_string())?;
    store.delete(second.id()).map_err(|e| e.to_string())?;

    match store.get(second.id()) {
        Err(StorageError::SnapshotNotFound { .. }) => {}
        other => return Err(format!("deleted snapshot still readable: {:?}", other.map(|s| s.id()))),
    }

    let (i3, r3) = fixture_pair("P1", "F1", 3);
    let third = store.save(i3, r3).map_err(|e| e.to_string())?;
    check(
        third.previous_snapshot_hash() == Some(first.snapshot_hash()),
        "new snapshot must link to the surviving head",
    )?;
    let report = store
        .verify_chain(&SubjectKey::new("P1", "F1"))
        .map_err(|e| e.to_string())?;
    check(report.is_intact(), format!("chain broken: {:?}", report.broken))
}

fn delete_superseded_is_rejected<S: SnapshotStore>(store: &S) -> Result<(), String> {
    let (i1, r1) = fixture_pair("P1", "F1", 1);
    let (i2, r2) = fixture_pair("P1", "F1", 2);
    let first = store.save(i1, r1).map_err(|e| e.to_string())?;
    store.save(i2, r2).map_err(|e| e.to_string())?;
    match store.delete(first.id()) {
        Err(StorageError::Superseded { .. }) => Ok(()),
        other => Err(format!("expected Superseded, got {:?}", other)),
    }
}
