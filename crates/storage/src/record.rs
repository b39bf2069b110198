use mrv_core::canonical::hash;
use mrv_core::{InputBundle, ResultBundle, SubjectKey};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Lifecycle of a snapshot. `Draft -> Locked` happens exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SnapshotState {
    Draft,
    Locked {
        /// RFC 3339 timestamp string.
        locked_at: String,
    },
}

/// One persisted orchestrator run.
///
/// Fields are private: the only writers are the store methods, and every
/// one of them checks the state first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    id: u64,
    subject: SubjectKey,
    input: InputBundle,
    result: ResultBundle,
    /// Reproducibility key of the InputBundle.
    input_hash: String,
    result_hash: String,
    previous_snapshot_hash: Option<String>,
    snapshot_hash: String,
    state: SnapshotState,
    /// RFC 3339 timestamp string.
    created_at: String,
}

/// The fields that make up a chain link.
#[derive(Serialize)]
struct ChainLink<'a> {
    id: u64,
    subject: &'a SubjectKey,
    input_hash: &'a str,
    result_hash: &'a str,
    previous_snapshot_hash: Option<&'a str>,
    created_at: &'a str,
}

/// Check that `result` was sealed correctly and computed from `input`.
/// Returns the `(input_hash, result_hash)` pair to record.
pub(crate) fn validate_pair(
    input: &InputBundle,
    result: &ResultBundle,
) -> Result<(String, String), StorageError> {
    let recomputed = result.content.hash()?;
    if recomputed != result.result_hash {
        return Err(StorageError::ResultHashMismatch {
            expected: result.result_hash.clone(),
            actual: recomputed,
        });
    }
    let input_bundle_hash = input.input_bundle_hash()?;
    if input_bundle_hash != result.content.input_bundle_hash {
        return Err(StorageError::InputBundleMismatch {
            expected: result.content.input_bundle_hash.clone(),
            actual: input_bundle_hash,
        });
    }
    Ok((input.reproducibility_key()?, recomputed))
}

impl Snapshot {
    pub(crate) fn create(
        id: u64,
        input: InputBundle,
        result: ResultBundle,
        previous_snapshot_hash: Option<String>,
        created_at: String,
    ) -> Result<Self, StorageError> {
        let (input_hash, result_hash) = validate_pair(&input, &result)?;
        let mut snapshot = Snapshot {
            id,
            subject: input.subject(),
            input,
            result,
            input_hash,
            result_hash,
            previous_snapshot_hash,
            snapshot_hash: String::new(),
            state: SnapshotState::Draft,
            created_at,
        };
        snapshot.snapshot_hash = snapshot.compute_hash()?;
        Ok(snapshot)
    }

    /// Hash over the chain-link fields.
    ///
    /// Bundles enter through `input_hash` and `result_hash`; compare those
    /// with [`Snapshot::recompute_bundle_hashes`] to detect edited bundles.
    /// The lock state is not part of the link, since locking happens after
    /// the link is written.
    pub fn compute_hash(&self) -> Result<String, StorageError> {
        Ok(hash(&ChainLink {
            id: self.id,
            subject: &self.subject,
            input_hash: &self.input_hash,
            result_hash: &self.result_hash,
            previous_snapshot_hash: self.previous_snapshot_hash.as_deref(),
            created_at: &self.created_at,
        })?)
    }

    /// `(input_hash, result_hash)` recomputed from the stored bundles.
    ///
    /// A result that no longer embeds its input's bundle hash yields an
    /// empty result hash, so it can never match the recorded one.
    pub fn recompute_bundle_hashes(&self) -> Result<(String, String), StorageError> {
        let input_hash = self.input.reproducibility_key()?;
        let embeds_input =
            self.result.content.input_bundle_hash == self.input.input_bundle_hash()?;
        let result_hash = if embeds_input {
            self.result.content.hash()?
        } else {
            String::new()
        };
        Ok((input_hash, result_hash))
    }

    fn ensure_draft(&self) -> Result<(), StorageError> {
        match &self.state {
            SnapshotState::Draft => Ok(()),
            SnapshotState::Locked { locked_at } => Err(StorageError::SnapshotLocked {
                id: self.id,
                locked_at: locked_at.clone(),
            }),
        }
    }

    pub(crate) fn lock(&mut self, locked_at: String) -> Result<(), StorageError> {
        self.ensure_draft()?;
        self.state = SnapshotState::Locked { locked_at };
        Ok(())
    }

    pub(crate) fn replace_bundles(
        &mut self,
        input: InputBundle,
        result: ResultBundle,
    ) -> Result<(), StorageError> {
        self.ensure_draft()?;
        let subject = input.subject();
        if subject != self.subject {
            return Err(StorageError::SubjectMismatch {
                id: self.id,
                expected: self.subject.to_string(),
                actual: subject.to_string(),
            });
        }
        let (input_hash, result_hash) = validate_pair(&input, &result)?;
        self.input = input;
        self.result = result;
        self.input_hash = input_hash;
        self.result_hash = result_hash;
        self.snapshot_hash = self.compute_hash()?;
        Ok(())
    }

    pub(crate) fn ensure_deletable(&self) -> Result<(), StorageError> {
        self.ensure_draft()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn subject(&self) -> &SubjectKey {
        &self.subject
    }

    pub fn input(&self) -> &InputBundle {
        &self.input
    }

    pub fn result(&self) -> &ResultBundle {
        &self.result
    }

    pub fn input_hash(&self) -> &str {
        &self.input_hash
    }

    pub fn result_hash(&self) -> &str {
        &self.result_hash
    }

    pub fn previous_snapshot_hash(&self) -> Option<&str> {
        self.previous_snapshot_hash.as_deref()
    }

    pub fn snapshot_hash(&self) -> &str {
        &self.snapshot_hash
    }

    pub fn state(&self) -> &SnapshotState {
        &self.state
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.state, SnapshotState::Locked { .. })
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }
}
