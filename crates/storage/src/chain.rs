//! Hash-chain verification over one subject's snapshots.

use mrv_core::SubjectKey;
use serde::Serialize;

use crate::error::StorageError;
use crate::record::Snapshot;

/// Why a link in the chain is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// The stored `snapshot_hash` no longer matches the snapshot's fields.
    HashMismatch,
    /// `previous_snapshot_hash` does not point at the prior snapshot.
    BrokenLink,
    /// The stored bundles no longer hash to the recorded `input_hash` or
    /// `result_hash`.
    BundleMismatch,
}

/// First invalid link found while walking a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainBreak {
    pub snapshot_id: u64,
    pub kind: BreakKind,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

/// Outcome of walking one subject's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub subject: SubjectKey,
    pub length: usize,
    /// `snapshot_hash` of the newest snapshot.
    pub head: Option<String>,
    pub broken: Option<ChainBreak>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.broken.is_none()
    }
}

/// Walk `snapshots` in id order and report the first broken link.
///
/// Snapshots of other subjects are ignored.
pub fn verify_chain(
    subject: &SubjectKey,
    snapshots: &[Snapshot],
) -> Result<ChainReport, StorageError> {
    let mut chain: Vec<&Snapshot> = snapshots.iter().filter(|s| s.subject() == subject).collect();
    chain.sort_by_key(|s| s.id());

    let mut previous: Option<&str> = None;
    let mut broken = None;
    for snapshot in &chain {
        let (input_hash, result_hash) = snapshot.recompute_bundle_hashes()?;
        let bundle_break = if input_hash != snapshot.input_hash() {
            Some((snapshot.input_hash(), input_hash))
        } else if result_hash != snapshot.result_hash() {
            Some((snapshot.result_hash(), result_hash))
        } else {
            None
        };
        if let Some((expected, actual)) = bundle_break {
            broken = Some(ChainBreak {
                snapshot_id: snapshot.id(),
                kind: BreakKind::BundleMismatch,
                expected: Some(expected.to_string()),
                actual: Some(actual),
            });
            break;
        }

        let recomputed = snapshot.compute_hash()?;
        if recomputed != snapshot.snapshot_hash() {
            broken = Some(ChainBreak {
                snapshot_id: snapshot.id(),
                kind: BreakKind::HashMismatch,
                expected: Some(snapshot.snapshot_hash().to_string()),
                actual: Some(recomputed),
            });
            break;
        }
        if snapshot.previous_snapshot_hash() != previous {
            broken = Some(ChainBreak {
                snapshot_id: snapshot.id(),
                kind: BreakKind::BrokenLink,
                expected: previous.map(str::to_string),
                actual: snapshot.previous_snapshot_hash().map(str::to_string),
            });
            break;
        }
        previous = Some(snapshot.snapshot_hash());
    }

    Ok(ChainReport {
        subject: subject.clone(),
        length: chain.len(),
        head: chain.last().map(|s| s.snapshot_hash().to_string()),
        broken,
    })
}
