use std::path::Path;

use mrv_evidence::{
    build_pack, key_fingerprint, read_public_key, read_secret_key, verify_pack, write_keypair,
    PackSigner, SignatureStatus, VerificationKey,
};
use mrv_storage::SnapshotStore;
use serde::Serialize;

use crate::workspace::Workspace;
use crate::Printer;

/// Read a shared secret; surrounding whitespace is not part of it.
fn read_hmac_secret(path: &Path) -> Result<Vec<u8>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading HMAC secret '{}': {}", path.display(), e))?;
    let secret = text.trim();
    if secret.is_empty() {
        return Err(format!("HMAC secret '{}' is empty", path.display()));
    }
    Ok(secret.as_bytes().to_vec())
}

#[derive(Serialize)]
struct PackSummary {
    snapshot_id: u64,
    path: String,
    bytes: usize,
    manifest_hash: String,
    signatures: Vec<String>,
}

pub(crate) fn cmd_pack(
    workspace: &Workspace,
    id: u64,
    out_path: &Path,
    hmac_secret: Option<&Path>,
    key: Option<&Path>,
    out: Printer,
) -> Result<(), String> {
    let mut signers = Vec::new();
    if let Some(path) = hmac_secret {
        signers.push(PackSigner::Hmac(read_hmac_secret(path)?));
    }
    if let Some(path) = key {
        signers.push(PackSigner::Ed25519(
            read_secret_key(path).map_err(|e| e.to_string())?,
        ));
    }

    let snapshot = workspace.store()?.get(id).map_err(|e| e.to_string())?;
    if !snapshot.is_locked() {
        tracing::warn!(snapshot = id, "packing a draft snapshot");
    }
    let pack = build_pack(&snapshot, &signers).map_err(|e| e.to_string())?;
    std::fs::write(out_path, &pack.bytes)
        .map_err(|e| format!("cannot write '{}': {}", out_path.display(), e))?;

    let summary = PackSummary {
        snapshot_id: id,
        path: out_path.display().to_string(),
        bytes: pack.bytes.len(),
        manifest_hash: pack.manifest_hash,
        signatures: signers
            .iter()
            .map(|s| match s {
                PackSigner::Hmac(_) => "HMAC-SHA256".to_string(),
                PackSigner::Ed25519(k) => format!("Ed25519 {}", key_fingerprint(&k.verifying_key())),
            })
            .collect(),
    };
    out.emit(&summary, || {
        format!(
            "wrote {} ({} bytes)\n  manifest_hash: {}\n  signatures:    {}",
            summary.path,
            summary.bytes,
            summary.manifest_hash,
            if summary.signatures.is_empty() {
                "none".to_string()
            } else {
                summary.signatures.join(", ")
            }
        )
    });
    Ok(())
}

pub(crate) fn cmd_verify_pack(
    pack_path: &Path,
    hmac_secret: Option<&Path>,
    pubkey: Option<&Path>,
    require_signature: bool,
    out: Printer,
) -> Result<(), String> {
    let mut keys = Vec::new();
    if let Some(path) = hmac_secret {
        keys.push(VerificationKey::Hmac(read_hmac_secret(path)?));
    }
    if let Some(path) = pubkey {
        keys.push(VerificationKey::Ed25519(
            read_public_key(path).map_err(|e| e.to_string())?,
        ));
    }

    let bytes = std::fs::read(pack_path)
        .map_err(|_| format!("file not found: {}", pack_path.display()))?;
    let report = verify_pack(&bytes, &keys).map_err(|e| e.to_string())?;

    out.emit(&report, || {
        let mut lines = vec![format!(
            "evidence pack for snapshot {}: {}",
            report.snapshot_id,
            if report.is_valid() { "valid" } else { "INVALID" }
        )];
        lines.push(format!(
            "  manifest {} {}",
            report.manifest_hash,
            if report.manifest_hash_ok { "ok" } else { "MISMATCH" }
        ));
        for artifact in &report.artifacts {
            lines.push(format!(
                "  {:<20} {}",
                artifact.name,
                if artifact.ok { "ok" } else { "MISMATCH" }
            ));
        }
        for name in &report.unexpected {
            lines.push(format!("  {:<20} unexpected", name));
        }
        for sig in &report.signatures {
            let status = match sig.status {
                SignatureStatus::Verified => "verified",
                SignatureStatus::Invalid => "INVALID",
                SignatureStatus::Unchecked => "not checked (no key)",
            };
            lines.push(format!("  signature {} {}", sig.algorithm, status));
        }
        lines.join("\n")
    });

    if !report.is_valid() {
        return Err(format!("evidence pack '{}' failed verification", pack_path.display()));
    }
    if require_signature && !report.is_signed() {
        return Err(format!(
            "evidence pack '{}' has no signature verified by the supplied keys",
            pack_path.display()
        ));
    }
    Ok(())
}

pub(crate) fn cmd_keygen(prefix: &str, out: Printer) -> Result<(), String> {
    let verifying_key = write_keypair(prefix).map_err(|e| e.to_string())?;
    let fingerprint = key_fingerprint(&verifying_key);
    out.emit(
        &serde_json::json!({
            "secret": format!("{}.secret", prefix),
            "public": format!("{}.pub", prefix),
            "key_id": fingerprint,
        }),
        || {
            format!(
                "Generated Ed25519 keypair: {}.secret, {}.pub (key id {})",
                prefix, prefix, fingerprint
            )
        },
    );
    Ok(())
}
