//! Manifest signatures: HMAC-SHA256 with a shared secret, Ed25519 with a
//! keypair. Both sign the canonical manifest bytes.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EvidenceError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
    #[serde(rename = "Ed25519")]
    Ed25519,
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SignatureAlgorithm::HmacSha256 => "HMAC-SHA256",
            SignatureAlgorithm::Ed25519 => "Ed25519",
        })
    }
}

/// One signature over the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub algorithm: SignatureAlgorithm,
    pub signature_b64: String,
    /// Ed25519 only. Informational: verification uses the keys supplied
    /// by the verifier, never this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_b64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

/// Contents of `signature.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub manifest_hash: String,
    pub signatures: Vec<SignatureEntry>,
}

/// Key material used to sign a pack.
pub enum PackSigner {
    Hmac(Vec<u8>),
    Ed25519(SigningKey),
}

impl PackSigner {
    pub fn sign(&self, payload: &[u8]) -> Result<SignatureEntry, EvidenceError> {
        match self {
            PackSigner::Hmac(secret) => {
                let mut mac = HmacSha256::new_from_slice(secret)
                    .map_err(|e| EvidenceError::InvalidKey(e.to_string()))?;
                mac.update(payload);
                Ok(SignatureEntry {
                    algorithm: SignatureAlgorithm::HmacSha256,
                    signature_b64: BASE64.encode(mac.finalize().into_bytes()),
                    public_key_b64: None,
                    key_id: None,
                })
            }
            PackSigner::Ed25519(key) => {
                let verifying_key = key.verifying_key();
                Ok(SignatureEntry {
                    algorithm: SignatureAlgorithm::Ed25519,
                    signature_b64: BASE64.encode(key.sign(payload).to_bytes()),
                    public_key_b64: Some(BASE64.encode(verifying_key.to_bytes())),
                    key_id: Some(key_fingerprint(&verifying_key)),
                })
            }
        }
    }
}

/// Key material used to check a pack's signatures.
#[derive(Debug, Clone)]
pub enum VerificationKey {
    Hmac(Vec<u8>),
    Ed25519(VerifyingKey),
}

impl VerificationKey {
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            VerificationKey::Hmac(_) => SignatureAlgorithm::HmacSha256,
            VerificationKey::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    /// Whether `entry` is a valid signature of `payload` under this key.
    /// Malformed signatures are simply invalid.
    pub fn verifies(&self, payload: &[u8], entry: &SignatureEntry) -> bool {
        if entry.algorithm != self.algorithm() {
            return false;
        }
        let Ok(signature) = BASE64.decode(&entry.signature_b64) else {
            return false;
        };
        match self {
            VerificationKey::Hmac(secret) => match HmacSha256::new_from_slice(secret) {
                Ok(mut mac) => {
                    mac.update(payload);
                    mac.verify_slice(&signature).is_ok()
                }
                Err(_) => false,
            },
            VerificationKey::Ed25519(key) => {
                let Ok(bytes) = <[u8; 64]>::try_from(signature.as_slice()) else {
                    return false;
                };
                key.verify_strict(payload, &Signature::from_bytes(&bytes))
                    .is_ok()
            }
        }
    }
}

// ──────────────────────────────────────────────
// Key files
// ──────────────────────────────────────────────

/// Generate a fresh Ed25519 keypair.
pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let mut rng = rand::rngs::OsRng;
    let signing_key = SigningKey::generate(&mut rng);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key)
}

/// Write `<prefix>.secret` (base64 seed, mode 0600 on Unix) and
/// `<prefix>.pub` (base64 public key).
pub fn write_keypair(prefix: &str) -> Result<VerifyingKey, EvidenceError> {
    let (signing_key, verifying_key) = generate_keypair();

    let secret_path = format!("{}.secret", prefix);
    std::fs::write(&secret_path, BASE64.encode(signing_key.to_bytes()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&secret_path, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::write(
        format!("{}.pub", prefix),
        BASE64.encode(verifying_key.to_bytes()),
    )?;
    Ok(verifying_key)
}

/// Read a base64-encoded 32-byte Ed25519 seed.
pub fn read_secret_key(path: &Path) -> Result<SigningKey, EvidenceError> {
    let bytes = read_key_bytes(path)?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Read a base64-encoded 32-byte Ed25519 public key.
pub fn read_public_key(path: &Path) -> Result<VerifyingKey, EvidenceError> {
    let bytes = read_key_bytes(path)?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| {
        EvidenceError::InvalidKey(format!("invalid public key in '{}': {}", path.display(), e))
    })
}

fn read_key_bytes(path: &Path) -> Result<[u8; 32], EvidenceError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        EvidenceError::InvalidKey(format!("error reading '{}': {}", path.display(), e))
    })?;
    let bytes = BASE64.decode(contents.trim()).map_err(|e| {
        EvidenceError::InvalidKey(format!("error decoding '{}': {}", path.display(), e))
    })?;
    bytes.try_into().map_err(|_| {
        EvidenceError::InvalidKey(format!(
            "invalid key length in '{}': expected 32 bytes",
            path.display()
        ))
    })
}

/// First 16 hex chars of the SHA-256 of the public key bytes.
pub fn key_fingerprint(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.to_bytes());
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}
