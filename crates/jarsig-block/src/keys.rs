//! Ed25519 key material encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::{BlockError, BlockResult};

/// Generate a new Ed25519 signing key.
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut rand::thread_rng())
}

/// SHA-256 fingerprint of a public key, hex-encoded.
pub fn key_fingerprint(key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn encode_signing_key(key: &SigningKey) -> String {
    STANDARD.encode(key.to_bytes())
}

pub fn decode_signing_key(encoded: &str) -> BlockResult<SigningKey> {
    let bytes: [u8; 32] = STANDARD
        .decode(encoded.trim())?
        .try_into()
        .map_err(|_| BlockError::InvalidKey("signing key must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    STANDARD.encode(key.as_bytes())
}

pub fn decode_verifying_key(encoded: &str) -> BlockResult<VerifyingKey> {
    let bytes: [u8; 32] = STANDARD
        .decode(encoded.trim())?
        .try_into()
        .map_err(|_| BlockError::InvalidKey("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| BlockError::InvalidKey(e.to_string()))
}
