//! Signer certificates and signer records.
//!
//! A certificate binds a subject name to an Ed25519 public key and is
//! signed by its issuer. A [`SignerRecord`] is the validated certificate
//! path of one signer, leaf first.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BlockError, BlockResult};
use crate::keys::{decode_verifying_key, encode_verifying_key, key_fingerprint};

/// An issuer-signed binding of subject name to public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Certificate {
    pub subject: String,
    pub issuer: String,
    /// Base64 Ed25519 public key of the subject
    pub public_key: String,
    /// Base64 Ed25519 signature of the issuer over the fields above
    pub signature: String,
}

#[derive(Serialize)]
struct ToBeSigned<'a> {
    subject: &'a str,
    issuer: &'a str,
    public_key: &'a str,
}

impl Certificate {
    /// Create a root certificate signed by its own key.
    pub fn self_signed(subject: &str, key: &SigningKey) -> BlockResult<Self> {
        let public_key = encode_verifying_key(&key.verifying_key());
        Self::signed(subject, subject, public_key, key)
    }

    /// Issue a certificate for `subject_key`, signed by `issuer`.
    pub fn issue(
        subject: &str,
        subject_key: &VerifyingKey,
        issuer: &Certificate,
        issuer_key: &SigningKey,
    ) -> BlockResult<Self> {
        if encode_verifying_key(&issuer_key.verifying_key()) != issuer.public_key {
            return Err(BlockError::InvalidKey(
                "issuer key does not match issuer certificate".to_string(),
            ));
        }
        Self::signed(
            subject,
            &issuer.subject,
            encode_verifying_key(subject_key),
            issuer_key,
        )
    }

    fn signed(
        subject: &str,
        issuer: &str,
        public_key: String,
        issuer_key: &SigningKey,
    ) -> BlockResult<Self> {
        let tbs = Self::tbs_bytes(subject, issuer, &public_key)?;
        let signature = issuer_key.sign(&tbs);
        Ok(Self {
            subject: subject.to_string(),
            issuer: issuer.to_string(),
            public_key,
            signature: STANDARD.encode(signature.to_bytes()),
        })
    }

    fn tbs_bytes(subject: &str, issuer: &str, public_key: &str) -> BlockResult<Vec<u8>> {
        Ok(serde_json::to_vec(&ToBeSigned {
            subject,
            issuer,
            public_key,
        })?)
    }

    pub fn verifying_key(&self) -> BlockResult<VerifyingKey> {
        decode_verifying_key(&self.public_key)
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    /// Check that `issuer` issued this certificate.
    pub fn verify_issued_by(&self, issuer: &Certificate) -> BlockResult<()> {
        if self.issuer != issuer.subject {
            return Err(BlockError::CertificatePath(format!(
                "{:?} is issued by {:?}, not {:?}",
                self.subject, self.issuer, issuer.subject
            )));
        }
        let sig_bytes = STANDARD.decode(&self.signature)?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| BlockError::CertificatePath(e.to_string()))?;
        let tbs = Self::tbs_bytes(&self.subject, &self.issuer, &self.public_key)?;
        issuer
            .verifying_key()?
            .verify(&tbs, &signature)
            .map_err(|_| {
                BlockError::CertificatePath(format!(
                    "bad issuer signature on {:?}",
                    self.subject
                ))
            })
    }

    /// SHA-256 over the encoded certificate, hex-encoded.
    ///
    /// Covers subject, issuer, key and signature, so re-issuing the same
    /// key under another name yields a new fingerprint. Trust anchors are
    /// matched against this value.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [&self.subject, &self.issuer, &self.public_key, &self.signature] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Fingerprint of the subject's public key alone.
    pub fn key_fingerprint(&self) -> BlockResult<String> {
        Ok(key_fingerprint(&self.verifying_key()?))
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (issuer {})", self.subject, self.issuer)
    }
}

/// Validate a leaf-first certificate path.
///
/// Each certificate must be issued by the next one and the last must be a
/// valid self-signed root. When `trust_anchors` is non-empty the root's
/// fingerprint must be listed there.
pub fn validate_path(path: &[Certificate], trust_anchors: &[String]) -> BlockResult<()> {
    let root = path
        .last()
        .ok_or_else(|| BlockError::CertificatePath("empty certificate path".to_string()))?;
    for pair in path.windows(2) {
        pair[0].verify_issued_by(&pair[1])?;
    }
    if !root.is_self_issued() {
        return Err(BlockError::CertificatePath(format!(
            "path ends at {:?}, which is not a root",
            root.subject
        )));
    }
    root.verify_issued_by(root)?;
    if !trust_anchors.is_empty() {
        let fingerprint = root.fingerprint();
        if !trust_anchors.iter().any(|a| a.eq_ignore_ascii_case(&fingerprint)) {
            return Err(BlockError::CertificatePath(format!(
                "root {:?} ({}) is not a trust anchor",
                root.subject, fingerprint
            )));
        }
    }
    Ok(())
}

/// The certificate path of one signer, leaf first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignerRecord {
    certificate_path: Vec<Certificate>,
}

impl SignerRecord {
    pub fn new(certificate_path: Vec<Certificate>) -> Self {
        Self { certificate_path }
    }

    pub fn certificate_path(&self) -> &[Certificate] {
        &self.certificate_path
    }

    /// The signer's own certificate.
    pub fn leaf(&self) -> Option<&Certificate> {
        self.certificate_path.first()
    }

    /// Fingerprint of the leaf certificate, or empty for an empty path.
    pub fn fingerprint(&self) -> String {
        self.leaf().map(Certificate::fingerprint).unwrap_or_default()
    }
}

impl fmt::Display for SignerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.leaf() {
            Some(leaf) => write!(f, "{}", leaf.subject),
            None => write!(f, "<empty path>"),
        }
    }
}
