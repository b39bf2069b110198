//! In-memory snapshot store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mrv_core::{InputBundle, ResultBundle, SubjectKey};

use crate::clock::{timestamp, Clock, SystemClock};
use crate::error::StorageError;
use crate::ledger::Ledger;
use crate::record::Snapshot;
use crate::traits::SnapshotStore;

/// Snapshot store held in process memory.
///
/// Writes that can change a chain take that subject's mutex first, so two
/// saves for the same subject never read the same predecessor. Hashing
/// happens outside the ledger lock.
pub struct InMemorySnapshotStore {
    ledger: RwLock<Ledger>,
    chains: Mutex<HashMap<SubjectKey, Arc<Mutex<()>>>>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Backend("lock poisoned".to_string())
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemorySnapshotStore {
            ledger: RwLock::new(Ledger::default()),
            chains: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            clock,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Ledger>, StorageError> {
        self.ledger.read().map_err(poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Ledger>, StorageError> {
        self.ledger.write().map_err(poisoned)
    }

    fn chain_lock(&self, subject: &SubjectKey) -> Result<Arc<Mutex<()>>, StorageError> {
        let mut chains = self.chains.lock().map_err(poisoned)?;
        Ok(chains
            .entry(subject.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    fn subject_of(&self, id: u64) -> Result<SubjectKey, StorageError> {
        Ok(self.read()?.get(id)?.subject().clone())
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(&self, input: InputBundle, result: ResultBundle) -> Result<Snapshot, StorageError> {
        let subject = input.subject();
        let chain = self.chain_lock(&subject)?;
        let _guard = chain.lock().map_err(poisoned)?;

        let previous = self
            .read()?
            .latest_for(&subject)
            .map(|s| s.snapshot_hash().to_string());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Snapshot::create(id, input, result, previous, timestamp(&*self.clock)?)?;
        self.write()?.insert(snapshot.clone());

        tracing::info!(
            snapshot_id = id,
            subject = %subject,
            input_hash = snapshot.input_hash(),
            result_hash = snapshot.result_hash(),
            "snapshot saved"
        );
        Ok(snapshot)
    }

    fn get(&self, id: u64) -> Result<Snapshot, StorageError> {
        self.read()?.get(id).cloned()
    }

    fn list(&self, subject: Option<&SubjectKey>) -> Result<Vec<Snapshot>, StorageError> {
        Ok(self.read()?.list(subject))
    }

    fn latest_for_subject(&self, subject: &SubjectKey) -> Result<Option<Snapshot>, StorageError> {
        Ok(self.read()?.latest_for(subject).cloned())
    }

    fn lock(&self, id: u64) -> Result<Snapshot, StorageError> {
        let locked_at = timestamp(&*self.clock)?;
        let mut ledger = self.write()?;
        let snapshot = ledger.get_mut(id)?;
        snapshot.lock(locked_at)?;
        tracing::info!(snapshot_id = id, "snapshot locked");
        Ok(snapshot.clone())
    }

    fn replace_bundles(
        &self,
        id: u64,
        input: InputBundle,
        result: ResultBundle,
    ) -> Result<Snapshot, StorageError> {
        let subject = self.subject_of(id)?;
        let chain = self.chain_lock(&subject)?;
        let _guard = chain.lock().map_err(poisoned)?;

        let mut ledger = self.write()?;
        ledger.ensure_chain_head(id)?;
        let snapshot = ledger.get_mut(id)?;
        snapshot.replace_bundles(input, result)?;
        tracing::debug!(snapshot_id = id, "snapshot bundles replaced");
        Ok(snapshot.clone())
    }

    fn delete(&self, id: u64) -> Result<(), StorageError> {
        let subject = self.subject_of(id)?;
        let chain = self.chain_lock(&subject)?;
        let _guard = chain.lock().map_err(poisoned)?;

        let mut ledger = self.write()?;
        ledger.ensure_chain_head(id)?.ensure_deletable()?;
        ledger.remove(id)?;
        tracing::info!(snapshot_id = id, "snapshot deleted");
        Ok(())
    }
}
