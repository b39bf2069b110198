use mrv_core::{InputBundle, ResultBundle, SubjectKey};

use crate::chain::{verify_chain, ChainReport};
use crate::error::StorageError;
use crate::record::Snapshot;

/// The storage trait for calculation snapshots.
///
/// A `SnapshotStore` keeps an append-only, hash-chained record of
/// orchestrator runs. Each subject (project/facility) has its own chain:
/// `save` links the new snapshot to the newest earlier snapshot of the same
/// subject through `previous_snapshot_hash`.
///
/// ## Lock semantics
///
/// Snapshots start as `Draft`. `lock` moves them to `Locked` exactly once.
/// `replace_bundles` and `delete` are rejected with
/// `StorageError::SnapshotLocked` for locked snapshots, and with
/// `StorageError::Superseded` once a later snapshot links to the target.
///
/// ## Thread Safety
///
/// Implementations must serialize writes per subject so that chain linkage
/// cannot race. Writes to different subjects may proceed concurrently.
pub trait SnapshotStore: Send + Sync {
    /// Validate and persist a bundle pair as a new draft snapshot.
    ///
    /// Fails with `ResultHashMismatch` if the ResultBundle's hash does not
    /// match its content, and with `InputBundleMismatch` if it was computed
    /// from a different InputBundle.
    fn save(&self, input: InputBundle, result: ResultBundle) -> Result<Snapshot, StorageError>;

    /// Read a snapshot by id.
    fn get(&self, id: u64) -> Result<Snapshot, StorageError>;

    /// List snapshots in id order, optionally filtered to one subject.
    fn list(&self, subject: Option<&SubjectKey>) -> Result<Vec<Snapshot>, StorageError>;

    /// Newest snapshot of a subject, if any.
    fn latest_for_subject(&self, subject: &SubjectKey) -> Result<Option<Snapshot>, StorageError>;

    /// Transition `Draft -> Locked`. Locking twice is an error.
    fn lock(&self, id: u64) -> Result<Snapshot, StorageError>;

    /// Replace the bundles of a draft snapshot that is still its chain head.
    fn replace_bundles(
        &self,
        id: u64,
        input: InputBundle,
        result: ResultBundle,
    ) -> Result<Snapshot, StorageError>;

    /// Delete a draft snapshot that is still its chain head.
    fn delete(&self, id: u64) -> Result<(), StorageError>;

    /// Walk a subject's chain and report the first broken link.
    fn verify_chain(&self, subject: &SubjectKey) -> Result<ChainReport, StorageError> {
        let snapshots = self.list(Some(subject))?;
        verify_chain(subject, &snapshots)
    }
}
