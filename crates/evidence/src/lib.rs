//! mrv-evidence: signed, reproducible evidence packs.
//!
//! A pack is a `.tar.gz` holding a snapshot's input and result bundles, its
//! compliance report, a lineage graph, a manifest of artifact hashes, and
//! zero or more signatures over the manifest.

mod error;
pub mod lineage;
pub mod manifest;
pub mod pack;
pub mod signing;

pub use error::EvidenceError;
pub use lineage::{Lineage, LineageEdge, LineageNode, NodeKind};
pub use manifest::{ArtifactEntry, Manifest, MANIFEST_FORMAT};
pub use pack::{
    build_pack, read_archive, verify_pack, ArtifactCheck, ComplianceReport, EvidencePack,
    PackVerification, SignatureCheck, SignatureStatus,
};
pub use signing::{
    generate_keypair, key_fingerprint, read_public_key, read_secret_key, write_keypair,
    PackSigner, SignatureAlgorithm, SignatureBlock, SignatureEntry, VerificationKey,
};
