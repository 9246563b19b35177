//! Error types for manifest parsing and serialization.

use std::io;

use thiserror::Error;

/// Errors raised while reading or writing a manifest.
///
/// Line numbers are 1-based physical lines of the input.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("line {line}: manifest line too long (limit {limit} bytes)")]
    LineTooLong { line: usize, limit: usize },

    #[error("line {line}: manifest line not terminated")]
    UnterminatedLine { line: usize },

    #[error("line {line}: invalid header field")]
    InvalidHeader { line: usize },

    #[error("invalid attribute name: {0:?}")]
    InvalidAttributeName(String),

    #[error("header value contains CR, LF or NUL: {0:?}")]
    InvalidValue(String),

    #[error("line {line}: continuation line without a preceding header")]
    MisplacedContinuation { line: usize },

    #[error("line {line}: entry section does not start with a Name header")]
    MissingName { line: usize },

    #[error("line {line}: header value is not valid UTF-8")]
    InvalidUtf8 { line: usize },

    #[error("main attributes carry neither Manifest-Version nor Signature-Version")]
    MissingVersion,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;
