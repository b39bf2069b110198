use mrv_core::CanonicalError;

/// Errors building, reading, or signing an evidence pack.
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    #[error("archive error: {0}")]
    Archive(#[from] std::io::Error),

    /// A required artifact is absent from the archive.
    #[error("evidence pack is missing '{0}'")]
    MissingArtifact(String),

    /// An artifact is present but does not parse.
    #[error("evidence pack artifact '{name}' is malformed: {message}")]
    MalformedArtifact { name: String, message: String },

    /// Key material could not be decoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}
