//! Error types for signature block handling.

use thiserror::Error;

/// Errors from parsing, validating or producing a signature block.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("malformed signature block: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("certificate path rejected: {0}")]
    CertificatePath(String),

    #[error("signature does not verify against the signature file")]
    SignatureMismatch,
}

/// Result alias for block operations.
pub type BlockResult<T> = Result<T, BlockError>;
