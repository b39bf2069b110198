//! File-backed snapshot store: one canonical JSON ledger file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use mrv_core::canonical::canonicalize;
use mrv_core::{InputBundle, ResultBundle, SubjectKey};

use crate::clock::{timestamp, Clock, SystemClock};
use crate::error::StorageError;
use crate::ledger::{Ledger, LedgerFile};
use crate::record::Snapshot;
use crate::traits::SnapshotStore;

/// Snapshot store persisted to a single JSON file.
///
/// Every call reads the file, applies the change and rewrites it through a
/// temporary file and a rename. One mutex guards the whole file, which also
/// serializes writes per subject.
pub struct FileSnapshotStore {
    path: PathBuf,
    guard: Mutex<()>,
    clock: Arc<dyn Clock>,
}

fn backend(context: &str, path: &Path, err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(format!("{} {}: {}", context, path.display(), err))
}

impl FileSnapshotStore {
    /// Open (or lazily create) the ledger at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| backend("cannot create", parent, e))?;
        }
        Ok(FileSnapshotStore {
            path,
            guard: Mutex::new(()),
            clock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn exclusive(&self) -> Result<MutexGuard<'_, ()>, StorageError> {
        self.guard
            .lock()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))
    }

    fn load(&self) -> Result<Ledger, StorageError> {
        if !self.path.exists() {
            return Ok(Ledger::default());
        }
        let bytes = fs::read(&self.path).map_err(|e| backend("cannot read", &self.path, e))?;
        let file: LedgerFile = serde_json::from_slice(&bytes)
            .map_err(|e| backend("invalid ledger", &self.path, e))?;
        Ok(Ledger::from_file(file))
    }

    fn store(&self, ledger: &Ledger) -> Result<(), StorageError> {
        let bytes = canonicalize(&ledger.to_file())?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|e| backend("cannot write", &tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| backend("cannot replace", &self.path, e))?;
        Ok(())
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, input: InputBundle, result: ResultBundle) -> Result<Snapshot, StorageError> {
        let _guard = self.exclusive()?;
        let mut ledger = self.load()?;

        let subject = input.subject();
        let previous = ledger
            .latest_for(&subject)
            .map(|s| s.snapshot_hash().to_string());
        let id = ledger.max_id() + 1;
        let snapshot = Snapshot::create(id, input, result, previous, timestamp(&*self.clock)?)?;
        ledger.insert(snapshot.clone());
        self.store(&ledger)?;

        tracing::info!(
            snapshot_id = id,
            subject = %subject,
            path = %self.path.display(),
            "snapshot saved"
        );
        Ok(snapshot)
    }

    fn get(&self, id: u64) -> Result<Snapshot, StorageError> {
        let _guard = self.exclusive()?;
        self.load()?.get(id).cloned()
    }

    fn list(&self, subject: Option<&SubjectKey>) -> Result<Vec<Snapshot>, StorageError> {
        let _guard = self.exclusive()?;
        Ok(self.load()?.list(subject))
    }

    fn latest_for_subject(&self, subject: &SubjectKey) -> Result<Option<Snapshot>, StorageError> {
        let _guard = self.exclusive()?;
        Ok(self.load()?.latest_for(subject).cloned())
    }

    fn lock(&self, id: u64) -> Result<Snapshot, StorageError> {
        let _guard = self.exclusive()?;
        let mut ledger = self.load()?;
        let snapshot = ledger.get_mut(id)?;
        snapshot.lock(timestamp(&*self.clock)?)?;
        let locked = snapshot.clone();
        self.store(&ledger)?;
        tracing::info!(snapshot_id = id, "snapshot locked");
        Ok(locked)
    }

    fn replace_bundles(
        &self,
        id: u64,
        input: InputBundle,
        result: ResultBundle,
    ) -> Result<Snapshot, StorageError> {
        let _guard = self.exclusive()?;
        let mut ledger = self.load()?;
        ledger.ensure_chain_head(id)?;
        let snapshot = ledger.get_mut(id)?;
        snapshot.replace_bundles(input, result)?;
        let replaced = snapshot.clone();
        self.store(&ledger)?;
        tracing::debug!(snapshot_id = id, "snapshot bundles replaced");
        Ok(replaced)
    }

    fn delete(&self, id: u64) -> Result<(), StorageError> {
        let _guard = self.exclusive()?;
        let mut ledger = self.load()?;
        ledger.ensure_chain_head(id)?.ensure_deletable()?;
        ledger.remove(id)?;
        self.store(&ledger)?;
        tracing::info!(snapshot_id = id, "snapshot deleted");
        Ok(())
    }
}
