//! Signature block capability for signed JAR verification.
//!
//! The verifier treats block decoding, certificate path validation and
//! signature checking as an opaque capability behind [`BlockParser`].
//! This crate provides that seam plus an Ed25519 implementation.

pub mod block;
pub mod certificate;
pub mod error;
pub mod keys;

pub use block::{
    BlockEnvelope, BlockParser, BlockSigner, Ed25519BlockParser, SignatureBlock,
    BLOCK_EXTENSION, BLOCK_FORMAT_VERSION, SIGNATURE_ALGORITHM,
};
pub use certificate::{validate_path, Certificate, SignerRecord};
pub use error::{BlockError, BlockResult};
pub use keys::{
    decode_signing_key, decode_verifying_key, encode_signing_key, encode_verifying_key,
    generate_signing_key, key_fingerprint,
};

pub use ed25519_dalek::{SigningKey, VerifyingKey};
