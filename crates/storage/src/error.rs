use mrv_core::CanonicalError;

/// All errors that can be returned by a `SnapshotStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No snapshot with the given id.
    #[error("snapshot not found: {id}")]
    SnapshotNotFound { id: u64 },

    /// Write attempted on a locked snapshot.
    #[error("snapshot {id} is locked (since {locked_at}); expected draft")]
    SnapshotLocked { id: u64, locked_at: String },

    /// A newer snapshot of the same subject links to this one, so its hash
    /// can no longer change.
    #[error("snapshot {id} is superseded by snapshot {successor} in the chain")]
    Superseded { id: u64, successor: u64 },

    /// The ResultBundle's `result_hash` does not match its content.
    #[error("result hash mismatch: expected {expected}, actual {actual}")]
    ResultHashMismatch { expected: String, actual: String },

    /// The ResultBundle was computed from a different InputBundle.
    #[error("input bundle hash mismatch: result references {expected}, input hashes to {actual}")]
    InputBundleMismatch { expected: String, actual: String },

    /// Replacement bundles belong to a different subject.
    #[error("subject mismatch for snapshot {id}: expected {expected}, actual {actual}")]
    SubjectMismatch {
        id: u64,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    /// A backend-specific storage error (I/O, serialization, poisoned lock).
    #[error("storage backend error: {0}")]
    Backend(String),
}
