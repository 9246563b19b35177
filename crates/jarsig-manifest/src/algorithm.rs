//! Digest algorithms recognised in manifest and signature-file attributes.
//!
//! Attribute keys carry the algorithm as a prefix, e.g. `SHA-256-Digest`
//! in a manifest entry or `SHA-256-Digest-Manifest-Main-Attributes` in a
//! `.SF` file. Algorithms we cannot compute are reported as `None` so
//! callers can skip them instead of failing.

use std::fmt;

use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

/// Suffix of per-entry digest attributes (`<ALG>-Digest`).
pub const DIGEST_SUFFIX: &str = "-Digest";

/// Suffix of the whole-manifest digest in a `.SF` file.
pub const MANIFEST_DIGEST_SUFFIX: &str = "-Digest-Manifest";

/// Suffix of the main-attributes digest in a `.SF` file.
pub const MAIN_ATTRIBUTES_DIGEST_SUFFIX: &str = "-Digest-Manifest-Main-Attributes";

/// A message digest algorithm usable for JAR entry and section digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// All supported algorithms, weakest first.
    pub const ALL: [DigestAlgorithm; 5] = [
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha224,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ];

    /// Parse an algorithm name as it appears in attribute keys.
    ///
    /// Matching is case-insensitive and accepts the common aliases
    /// (`SHA`, `SHA1`, `SHA-1`, `SHA256`, `SHA-256`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match normalized.as_str() {
            "SHA" | "SHA1" => Some(Self::Sha1),
            "SHA224" => Some(Self::Sha224),
            "SHA256" => Some(Self::Sha256),
            "SHA384" => Some(Self::Sha384),
            "SHA512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Spelling used when writing `<ALG>-Digest` attribute keys.
    pub fn jar_name(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha224 => "SHA-224",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Length of the digest output in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Start a streaming digest computation.
    pub fn context(&self) -> DigestContext {
        match self {
            Self::Sha1 => DigestContext::Sha1(Sha1::new()),
            Self::Sha224 => DigestContext::Sha224(Sha224::new()),
            Self::Sha256 => DigestContext::Sha256(Sha256::new()),
            Self::Sha384 => DigestContext::Sha384(Sha384::new()),
            Self::Sha512 => DigestContext::Sha512(Sha512::new()),
        }
    }

    /// One-shot digest of `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut ctx = self.context();
        ctx.update(data);
        ctx.finalize()
    }

    /// Attribute key for a per-entry digest, e.g. `SHA-256-Digest`.
    pub fn digest_key(&self) -> String {
        format!("{}{}", self.jar_name(), DIGEST_SUFFIX)
    }

    /// Attribute key for the whole-manifest digest in a `.SF` file.
    pub fn manifest_digest_key(&self) -> String {
        format!("{}{}", self.jar_name(), MANIFEST_DIGEST_SUFFIX)
    }

    /// Attribute key for the main-attributes digest in a `.SF` file.
    pub fn main_attributes_digest_key(&self) -> String {
        format!("{}{}", self.jar_name(), MAIN_ATTRIBUTES_DIGEST_SUFFIX)
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.jar_name())
    }
}

/// Kind of digest attribute recognised by [`classify_digest_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestKey {
    /// `<ALG>-Digest`
    Entry,
    /// `<ALG>-Digest-Manifest`
    Manifest,
    /// `<ALG>-Digest-Manifest-Main-Attributes`
    MainAttributes,
}

/// Split an attribute key into its digest kind and algorithm name.
///
/// Returns the raw algorithm prefix so callers can log unsupported names.
pub fn classify_digest_key(key: &str) -> Option<(DigestKey, &str)> {
    let upper = key.to_ascii_uppercase();
    // Longest suffix first; the shorter ones are suffixes of nothing else.
    for (suffix, kind) in [
        (MAIN_ATTRIBUTES_DIGEST_SUFFIX, DigestKey::MainAttributes),
        (MANIFEST_DIGEST_SUFFIX, DigestKey::Manifest),
        (DIGEST_SUFFIX, DigestKey::Entry),
    ] {
        if upper.ends_with(&suffix.to_ascii_uppercase()) && key.len() > suffix.len() {
            return Some((kind, &key[..key.len() - suffix.len()]));
        }
    }
    None
}

/// Streaming digest over one of the supported algorithms.
#[derive(Clone)]
pub enum DigestContext {
    Sha1(Sha1),
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl DigestContext {
    pub fn algorithm(&self) -> DigestAlgorithm {
        match self {
            Self::Sha1(_) => DigestAlgorithm::Sha1,
            Self::Sha224(_) => DigestAlgorithm::Sha224,
            Self::Sha256(_) => DigestAlgorithm::Sha256,
            Self::Sha384(_) => DigestAlgorithm::Sha384,
            Self::Sha512(_) => DigestAlgorithm::Sha512,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha224(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha224(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

impl fmt::Debug for DigestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DigestContext").field(&self.algorithm()).finish()
    }
}
