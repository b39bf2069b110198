//! Evidence pack archive: build and verify.
//!
//! The archive is a gzip-compressed tar with entries in a fixed order, each
//! with mtime 0, mode 0644 and uid/gid 0, so packing the same snapshot with
//! the same keys always yields the same bytes.

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use mrv_core::{canonicalize, CheckStatus, ComplianceCheck, QaFlag};
use mrv_storage::Snapshot;
use serde::{Deserialize, Serialize};

use crate::error::EvidenceError;
use crate::lineage::Lineage;
use crate::manifest::{ArtifactEntry, Manifest, MANIFEST_FORMAT};
use crate::signing::{PackSigner, SignatureAlgorithm, SignatureBlock, VerificationKey};

pub const INPUT_BUNDLE: &str = "input_bundle.json";
pub const RESULT_BUNDLE: &str = "result_bundle.json";
pub const COMPLIANCE: &str = "compliance.json";
pub const LINEAGE: &str = "lineage.json";
pub const MANIFEST: &str = "manifest.json";
pub const SIGNATURE: &str = "signature.json";

/// Contents of `compliance.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub status: CheckStatus,
    pub checks: Vec<ComplianceCheck>,
    pub qa_flags: Vec<QaFlag>,
}

/// A built pack.
#[derive(Debug, Clone)]
pub struct EvidencePack {
    pub bytes: Vec<u8>,
    pub manifest: Manifest,
    pub manifest_hash: String,
}

/// Package a snapshot, signing the manifest with every signer given.
pub fn build_pack(snapshot: &Snapshot, signers: &[PackSigner]) -> Result<EvidencePack, EvidenceError> {
    let result = snapshot.result();
    let compliance = ComplianceReport {
        status: result.content.compliance_status,
        checks: result.content.compliance_checks.clone(),
        qa_flags: result.content.qa_flags.clone(),
    };
    let lineage = Lineage::build(snapshot.id(), snapshot.input(), result)?;

    let artifacts: Vec<(&str, Vec<u8>)> = vec![
        (INPUT_BUNDLE, canonicalize(snapshot.input())?),
        (RESULT_BUNDLE, canonicalize(result)?),
        (COMPLIANCE, canonicalize(&compliance)?),
        (LINEAGE, canonicalize(&lineage)?),
    ];

    let mut entries: Vec<ArtifactEntry> = artifacts
        .iter()
        .map(|(name, bytes)| ArtifactEntry::describe(name, bytes))
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let manifest = Manifest {
        format: MANIFEST_FORMAT.to_string(),
        snapshot_id: snapshot.id(),
        subject: snapshot.subject().clone(),
        input_hash: snapshot.input_hash().to_string(),
        result_hash: snapshot.result_hash().to_string(),
        snapshot_hash: snapshot.snapshot_hash().to_string(),
        previous_snapshot_hash: snapshot.previous_snapshot_hash().map(str::to_string),
        locked: snapshot.is_locked(),
        created_at: snapshot.created_at().to_string(),
        artifacts: entries,
    };
    let manifest_bytes = manifest.canonical_bytes()?;
    let manifest_hash = manifest.manifest_hash()?;
    let signature = SignatureBlock {
        manifest_hash: manifest_hash.clone(),
        signatures: signers
            .iter()
            .map(|s| s.sign(&manifest_bytes))
            .collect::<Result<_, _>>()?,
    };

    let mut files = artifacts;
    files.push((MANIFEST, manifest_bytes));
    files.push((SIGNATURE, canonicalize(&signature)?));
    let bytes = write_archive(&files)?;

    tracing::info!(
        snapshot = snapshot.id(),
        manifest_hash = %manifest_hash,
        signatures = signature.signatures.len(),
        bytes = bytes.len(),
        "evidence pack built"
    );
    Ok(EvidencePack {
        bytes,
        manifest,
        manifest_hash,
    })
}

pub(crate) fn write_archive(files: &[(&str, Vec<u8>)]) -> Result<Vec<u8>, EvidenceError> {
    let gz = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(gz);
    for (name, bytes) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        tar.append_data(&mut header, name, bytes.as_slice())?;
    }
    Ok(tar.into_inner()?.finish()?)
}

/// Read every regular entry of a pack into memory.
pub fn read_archive(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, EvidenceError> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut files = BTreeMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        files.insert(name, content);
    }
    Ok(files)
}

// ──────────────────────────────────────────────
// Verification
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactCheck {
    pub name: String,
    pub expected_sha256: String,
    /// `None` when the artifact is missing from the archive.
    pub actual_sha256: Option<String>,
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    /// A supplied key verified the signature.
    Verified,
    /// Keys of this algorithm were supplied but none verified it.
    Invalid,
    /// No key of this algorithm was supplied.
    Unchecked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureCheck {
    pub algorithm: SignatureAlgorithm,
    pub key_id: Option<String>,
    pub status: SignatureStatus,
}

/// Outcome of verifying a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackVerification {
    pub snapshot_id: u64,
    pub manifest_hash: String,
    /// The hash recorded in `signature.json` matches the manifest.
    pub manifest_hash_ok: bool,
    pub artifacts: Vec<ArtifactCheck>,
    /// Archive entries the manifest does not list.
    pub unexpected: Vec<String>,
    pub signatures: Vec<SignatureCheck>,
}

impl PackVerification {
    /// Every hash matches, nothing extra is packed, and no signature failed.
    pub fn is_valid(&self) -> bool {
        self.manifest_hash_ok
            && self.unexpected.is_empty()
            && self.artifacts.iter().all(|a| a.ok)
            && self
                .signatures
                .iter()
                .all(|s| s.status != SignatureStatus::Invalid)
    }

    /// At least one signature was verified with a supplied key.
    pub fn is_signed(&self) -> bool {
        self.signatures
            .iter()
            .any(|s| s.status == SignatureStatus::Verified)
    }
}

/// Recompute artifact hashes, the manifest hash, and every signature a key
/// was supplied for.
///
/// Content mismatches are reported, not returned as errors; `Err` means the
/// archive or its manifest could not be read at all.
pub fn verify_pack(
    bytes: &[u8],
    keys: &[VerificationKey],
) -> Result<PackVerification, EvidenceError> {
    let files = read_archive(bytes)?;
    let manifest: Manifest = parse(&files, MANIFEST)?;
    let signature: SignatureBlock = parse(&files, SIGNATURE)?;

    let manifest_bytes = manifest.canonical_bytes()?;
    let manifest_hash = manifest.manifest_hash()?;

    let artifacts = manifest
        .artifacts
        .iter()
        .map(|entry| {
            let actual = files.get(&entry.name).map(|b| mrv_core::sha256_hex(b));
            ArtifactCheck {
                name: entry.name.clone(),
                expected_sha256: entry.sha256.clone(),
                ok: actual.as_deref() == Some(entry.sha256.as_str()),
                actual_sha256: actual,
            }
        })
        .collect();

    let unexpected = files
        .keys()
        .filter(|name| {
            name.as_str() != MANIFEST
                && name.as_str() != SIGNATURE
                && manifest.artifact(name).is_none()
        })
        .cloned()
        .collect();

    let signatures = signature
        .signatures
        .iter()
        .map(|entry| {
            let candidates: Vec<&VerificationKey> = keys
                .iter()
                .filter(|k| k.algorithm() == entry.algorithm)
                .collect();
            let status = if candidates.is_empty() {
                SignatureStatus::Unchecked
            } else if candidates.iter().any(|k| k.verifies(&manifest_bytes, entry)) {
                SignatureStatus::Verified
            } else {
                SignatureStatus::Invalid
            };
            SignatureCheck {
                algorithm: entry.algorithm,
                key_id: entry.key_id.clone(),
                status,
            }
        })
        .collect();

    let report = PackVerification {
        snapshot_id: manifest.snapshot_id,
        manifest_hash_ok: signature.manifest_hash == manifest_hash,
        manifest_hash,
        artifacts,
        unexpected,
        signatures,
    };
    tracing::info!(
        snapshot = report.snapshot_id,
        valid = report.is_valid(),
        signed = report.is_signed(),
        "evidence pack verified"
    );
    Ok(report)
}

fn parse<T: serde::de::DeserializeOwned>(
    files: &BTreeMap<String, Vec<u8>>,
    name: &str,
) -> Result<T, EvidenceError> {
    let bytes = files
        .get(name)
        .ok_or_else(|| EvidenceError::MissingArtifact(name.to_string()))?;
    serde_json::from_slice(bytes).map_err(|e| EvidenceError::MalformedArtifact {
        name: name.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::generate_keypair;
    use mrv_storage::conformance::fixture_pair;
    use mrv_storage::{InMemorySnapshotStore, SnapshotStore};

    fn locked_snapshot() -> Snapshot {
        let store = InMemorySnapshotStore::new();
        let (input, result) = fixture_pair("P1", "F1", 42);
        let saved = store.save(input, result).unwrap();
        store.lock(saved.id()).unwrap()
    }

    #[test]
    fn same_snapshot_packs_to_same_bytes() {
        let snapshot = locked_snapshot();
        let signers = [PackSigner::Hmac(b"secret".to_vec())];
        let a = build_pack(&snapshot, &signers).unwrap();
        let b = build_pack(&snapshot, &signers).unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.manifest_hash, b.manifest_hash);
        assert!(a.manifest.locked);
    }

    #[test]
    fn archive_has_fixed_entry_order() {
        let pack = build_pack(&locked_snapshot(), &[]).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(pack.bytes.as_slice()));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![INPUT_BUNDLE, RESULT_BUNDLE, COMPLIANCE, LINEAGE, MANIFEST, SIGNATURE]
        );
        let manifest_names: Vec<&str> =
            pack.manifest.artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            manifest_names,
            vec![COMPLIANCE, INPUT_BUNDLE, LINEAGE, RESULT_BUNDLE]
        );
    }

    #[test]
    fn intact_pack_verifies_with_both_algorithms() {
        let (signing, verifying) = generate_keypair();
        let signers = [
            PackSigner::Hmac(b"secret".to_vec()),
            PackSigner::Ed25519(signing),
        ];
        let pack = build_pack(&locked_snapshot(), &signers).unwrap();
        let keys = [
            VerificationKey::Hmac(b"secret".to_vec()),
            VerificationKey::Ed25519(verifying),
        ];
        let report = verify_pack(&pack.bytes, &keys).unwrap();
        assert!(report.is_valid(), "{:?}", report);
        assert!(report.is_signed());
        assert!(report
            .signatures
            .iter()
            .all(|s| s.status == SignatureStatus::Verified));
        assert_eq!(report.manifest_hash, pack.manifest_hash);
    }

    #[test]
    fn tampered_artifact_is_detected() {
        let pack = build_pack(&locked_snapshot(), &[PackSigner::Hmac(b"k".to_vec())]).unwrap();
        let files = read_archive(&pack.bytes).unwrap();
        let mut rewritten: Vec<(&str, Vec<u8>)> = Vec::new();
        for name in [INPUT_BUNDLE, RESULT_BUNDLE, COMPLIANCE, LINEAGE, MANIFEST, SIGNATURE] {
            let mut bytes = files[name].clone();
            if name == RESULT_BUNDLE {
                let text = String::from_utf8(bytes).unwrap();
                bytes = text.replacen("\"42\"", "\"41\"", 1).into_bytes();
            }
            rewritten.push((name, bytes));
        }
        let tampered = write_archive(&rewritten).unwrap();

        let report = verify_pack(&tampered, &[VerificationKey::Hmac(b"k".to_vec())]).unwrap();
        assert!(!report.is_valid());
        let check = report.artifacts.iter().find(|a| a.name == RESULT_BUNDLE).unwrap();
        assert!(!check.ok);
        assert!(report.manifest_hash_ok);
        assert_eq!(report.signatures[0].status, SignatureStatus::Verified);
    }

    #[test]
    fn wrong_key_marks_signature_invalid() {
        let pack = build_pack(&locked_snapshot(), &[PackSigner::Hmac(b"right".to_vec())]).unwrap();
        let report = verify_pack(&pack.bytes, &[VerificationKey::Hmac(b"wrong".to_vec())]).unwrap();
        assert_eq!(report.signatures[0].status, SignatureStatus::Invalid);
        assert!(!report.is_valid());

        let unchecked = verify_pack(&pack.bytes, &[]).unwrap();
        assert_eq!(unchecked.signatures[0].status, SignatureStatus::Unchecked);
        assert!(unchecked.is_valid());
        assert!(!unchecked.is_signed());
    }

    #[test]
    fn garbage_bytes_are_an_error_not_a_panic() {
        assert!(verify_pack(b"definitely not a tarball", &[]).is_err());
    }
}
