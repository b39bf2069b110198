//! Snapshot bookkeeping shared by every store backend.

use std::collections::BTreeMap;

use mrv_core::SubjectKey;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::record::Snapshot;

/// All snapshots, keyed by id.
#[derive(Debug, Clone, Default)]
pub(crate) struct Ledger {
    snapshots: BTreeMap<u64, Snapshot>,
}

/// On-disk form of a ledger.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct LedgerFile {
    pub snapshots: Vec<Snapshot>,
}

impl Ledger {
    pub fn from_file(file: LedgerFile) -> Self {
        Ledger {
            snapshots: file
                .snapshots
                .into_iter()
                .map(|s| (s.id(), s))
                .collect(),
        }
    }

    pub fn to_file(&self) -> LedgerFile {
        LedgerFile {
            snapshots: self.snapshots.values().cloned().collect(),
        }
    }

    pub fn max_id(&self) -> u64 {
        self.snapshots.keys().next_back().copied().unwrap_or(0)
    }

    pub fn insert(&mut self, snapshot: Snapshot) {
        self.snapshots.insert(snapshot.id(), snapshot);
    }

    pub fn get(&self, id: u64) -> Result<&Snapshot, StorageError> {
        self.snapshots
            .get(&id)
            .ok_or(StorageError::SnapshotNotFound { id })
    }

    pub fn get_mut(&mut self, id: u64) -> Result<&mut Snapshot, StorageError> {
        self.snapshots
            .get_mut(&id)
            .ok_or(StorageError::SnapshotNotFound { id })
    }

    pub fn list(&self, subject: Option<&SubjectKey>) -> Vec<Snapshot> {
        self.snapshots
            .values()
            .filter(|s| subject.map_or(true, |subj| s.subject() == subj))
            .cloned()
            .collect()
    }

    pub fn latest_for(&self, subject: &SubjectKey) -> Option<&Snapshot> {
        self.snapshots
            .values()
            .rev()
            .find(|s| s.subject() == subject)
    }

    /// Reject changes to a snapshot's hash once a later snapshot of the same
    /// subject links to it.
    pub fn ensure_chain_head(&self, id: u64) -> Result<&Snapshot, StorageError> {
        let snapshot = self.get(id)?;
        let successor = self
            .snapshots
            .range(id + 1..)
            .map(|(_, s)| s)
            .find(|s| s.subject() == snapshot.subject());
        match successor {
            Some(next) => Err(StorageError::Superseded {
                id,
                successor: next.id(),
            }),
            None => Ok(snapshot),
        }
    }

    pub fn remove(&mut self, id: u64) -> Result<Snapshot, StorageError> {
        self.snapshots
            .remove(&id)
            .ok_or(StorageError::SnapshotNotFound { id })
    }
}
