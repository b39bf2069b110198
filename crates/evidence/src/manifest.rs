//! The pack manifest: what was packaged, and the hash of each artifact.

use mrv_core::{canonicalize, sha256_hex, SubjectKey};
use serde::{Deserialize, Serialize};

use crate::error::EvidenceError;

pub const MANIFEST_FORMAT: &str = "mrv-evidence/1";

/// One packaged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub name: String,
    pub sha256: String,
    pub size: u64,
}

impl ArtifactEntry {
    pub fn describe(name: &str, bytes: &[u8]) -> Self {
        ArtifactEntry {
            name: name.to_string(),
            sha256: sha256_hex(bytes),
            size: bytes.len() as u64,
        }
    }
}

/// Manifest of one evidence pack.
///
/// Everything here comes from the snapshot, so packing the same snapshot
/// twice yields the same manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format: String,
    pub snapshot_id: u64,
    pub subject: SubjectKey,
    pub input_hash: String,
    pub result_hash: String,
    pub snapshot_hash: String,
    pub previous_snapshot_hash: Option<String>,
    pub locked: bool,
    /// RFC 3339 creation time of the snapshot.
    pub created_at: String,
    /// Sorted by name.
    pub artifacts: Vec<ArtifactEntry>,
}

impl Manifest {
    /// Canonical manifest bytes: the payload every signature covers.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, EvidenceError> {
        Ok(canonicalize(self)?)
    }

    /// SHA-256 of the canonical manifest bytes.
    pub fn manifest_hash(&self) -> Result<String, EvidenceError> {
        Ok(sha256_hex(&self.canonical_bytes()?))
    }

    pub fn artifact(&self, name: &str) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}
