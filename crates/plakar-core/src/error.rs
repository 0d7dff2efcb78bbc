use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlakarError>;

#[derive(Debug, Error)]
pub enum PlakarError {
    #[error("repository not found at '{0}'")]
    RepoNotFound(String),

    #[error("repository already exists at '{0}'")]
    RepoAlreadyExists(String),

    #[error("{kind} blob not found: {id}")]
    BlobNotFound { kind: &'static str, id: String },

    #[error("snapshot not found: '{0}'")]
    SnapshotNotFound(String),

    #[error("ambiguous snapshot id prefix: '{0}'")]
    AmbiguousSnapshot(String),

    #[error("checksum mismatch for {context}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("decryption failed: wrong passphrase or corrupted data")]
    DecryptionFailed,

    #[error("snapshot signature mismatch")]
    SignatureMismatch,

    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("unsupported repository version: {0}")]
    UnsupportedVersion(String),

    #[error("unsupported backend: '{0}'")]
    UnsupportedBackend(String),

    #[error("repository is busy: {0}")]
    Busy(String),

    #[error("operation canceled")]
    Canceled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("decompression error: {0}")]
    Decompression(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
