//! Signature block parsing and production.
//!
//! The verifier only sees the [`BlockParser`] and [`SignatureBlock`]
//! traits. [`Ed25519BlockParser`] reads the JSON block envelope written by
//! [`BlockSigner`]: a certificate path plus an Ed25519 signature over the
//! exact bytes of the companion `.SF` file, which may be embedded.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use jarsig_manifest::DigestAlgorithm;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::certificate::{validate_path, Certificate, SignerRecord};
use crate::error::{BlockError, BlockResult};
use crate::keys::encode_verifying_key;

/// Envelope format version
pub const BLOCK_FORMAT_VERSION: u32 = 1;

/// Signature algorithm identifier
pub const SIGNATURE_ALGORITHM: &str = "Ed25519";

/// Extension used for blocks written by [`BlockSigner`].
pub const BLOCK_EXTENSION: &str = "EC";

/// A decoded signature block awaiting verification against its `.SF` file.
pub trait SignatureBlock: fmt::Debug + Send {
    /// Digest algorithm the block declares for its signature file.
    fn digest_algorithm(&self) -> DigestAlgorithm;

    /// The `.SF` content carried inside the block, if any.
    ///
    /// Blocks without embedded content need the separate `.SF` file.
    fn embedded_signature_file(&self) -> Option<&[u8]>;

    /// Verify the block's signature over `signature_file`.
    fn verify(&self, signature_file: &[u8]) -> BlockResult<SignerRecord>;
}

/// Decodes raw signature block files.
pub trait BlockParser: Send + Sync {
    fn parse(&self, name: &str, bytes: &[u8]) -> BlockResult<Box<dyn SignatureBlock>>;
}

/// On-disk representation of a signature block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEnvelope {
    pub version: u32,

    /// Digest algorithm used inside the signature file
    pub digest_algorithm: String,

    /// Signature algorithm identifier (always "Ed25519")
    pub signature_algorithm: String,

    /// Certificate path, leaf first
    pub certificates: Vec<Certificate>,

    /// Base64 signature over the signature file bytes
    pub signature: String,

    /// Base64 signature file content, when embedded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_file: Option<String>,
}

/// Parser for [`BlockEnvelope`] blocks.
#[derive(Debug, Clone, Default)]
pub struct Ed25519BlockParser {
    trust_anchors: Vec<String>,
}

impl Ed25519BlockParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept certificate paths rooted at one of these fingerprints.
    pub fn with_trust_anchors(trust_anchors: Vec<String>) -> Self {
        Self { trust_anchors }
    }
}

impl BlockParser for Ed25519BlockParser {
    fn parse(&self, name: &str, bytes: &[u8]) -> BlockResult<Box<dyn SignatureBlock>> {
        let envelope: BlockEnvelope = serde_json::from_slice(bytes)?;
        if envelope.version != BLOCK_FORMAT_VERSION {
            return Err(BlockError::Malformed(format!(
                "{}: unsupported block version {}",
                name, envelope.version
            )));
        }
        if envelope.signature_algorithm != SIGNATURE_ALGORITHM {
            return Err(BlockError::UnsupportedAlgorithm(
                envelope.signature_algorithm,
            ));
        }
        let digest_algorithm = DigestAlgorithm::from_name(&envelope.digest_algorithm)
            .ok_or_else(|| BlockError::UnsupportedAlgorithm(envelope.digest_algorithm.clone()))?;

        validate_path(&envelope.certificates, &self.trust_anchors)?;

        let sig_bytes = STANDARD.decode(&envelope.signature)?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| BlockError::Malformed(format!("{}: {}", name, e)))?;
        let embedded = envelope
            .signature_file
            .as_deref()
            .map(|sf| STANDARD.decode(sf))
            .transpose()?;

        debug!(
            "parsed block {} signed by {} ({})",
            name,
            envelope.certificates[0].subject,
            digest_algorithm
        );
        Ok(Box::new(Ed25519Block {
            digest_algorithm,
            certificates: envelope.certificates,
            signature,
            embedded,
        }))
    }
}

#[derive(Debug)]
struct Ed25519Block {
    digest_algorithm: DigestAlgorithm,
    certificates: Vec<Certificate>,
    signature: Signature,
    embedded: Option<Vec<u8>>,
}

impl SignatureBlock for Ed25519Block {
    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    fn embedded_signature_file(&self) -> Option<&[u8]> {
        self.embedded.as_deref()
    }

    fn verify(&self, signature_file: &[u8]) -> BlockResult<SignerRecord> {
        // validate_path already guaranteed a non-empty path
        let leaf = &self.certificates[0];
        leaf.verifying_key()?
            .verify(signature_file, &self.signature)
            .map_err(|_| BlockError::SignatureMismatch)?;
        Ok(SignerRecord::new(self.certificates.clone()))
    }
}

/// Produces signature blocks for one signer.
pub struct BlockSigner {
    key: SigningKey,
    certificates: Vec<Certificate>,
    digest_algorithm: DigestAlgorithm,
}

impl BlockSigner {
    /// `certificates` is the signer's path, leaf first; the leaf must
    /// certify `key`.
    pub fn new(
        key: SigningKey,
        certificates: Vec<Certificate>,
        digest_algorithm: DigestAlgorithm,
    ) -> BlockResult<Self> {
        let leaf = certificates
            .first()
            .ok_or_else(|| BlockError::CertificatePath("empty certificate path".to_string()))?;
        if leaf.public_key != encode_verifying_key(&key.verifying_key()) {
            return Err(BlockError::InvalidKey(
                "signing key does not match the leaf certificate".to_string(),
            ));
        }
        Ok(Self {
            key,
            certificates,
            digest_algorithm,
        })
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// Sign the exact `.SF` bytes; `embed` carries them inside the block.
    pub fn sign(&self, signature_file: &[u8], embed: bool) -> BlockResult<Vec<u8>> {
        let signature = self.key.sign(signature_file);
        let envelope = BlockEnvelope {
            version: BLOCK_FORMAT_VERSION,
            digest_algorithm: self.digest_algorithm.jar_name().to_string(),
            signature_algorithm: SIGNATURE_ALGORITHM.to_string(),
            certificates: self.certificates.clone(),
            signature: STANDARD.encode(signature.to_bytes()),
            signature_file: embed.then(|| STANDARD.encode(signature_file)),
        };
        Ok(serde_json::to_vec_pretty(&envelope)?)
    }
}

impl fmt::Debug for BlockSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockSigner")
            .field("certificates", &self.certificates)
            .field("digest_algorithm", &self.digest_algorithm)
            .finish_non_exhaustive()
    }
}
