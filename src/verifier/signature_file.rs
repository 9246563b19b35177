//! Signature file (`.SF`) checking against the manifest.
//!
//! A signature file names the entries its signer vouches for, each with a
//! digest of that entry's manifest section. When the file also carries a
//! digest of the whole manifest and that digest matches, every entry it
//! names is accepted without looking at individual sections. Otherwise the
//! main-attributes digest (if declared) must match and each section is
//! checked on its own; a section that fails only drops that entry.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jarsig_manifest::{
    classify_digest_key, declared_digests, DigestAlgorithm, DigestKey, Manifest, ManifestDigester,
    ManifestError, MAIN_ATTRIBUTES,
};
use log::{debug, warn};
use thiserror::Error;

use crate::config::VerifierConfig;

#[derive(Debug, Error)]
pub enum SignatureFileError {
    #[error("malformed signature file: {0}")]
    Format(#[from] ManifestError),

    #[error("{0} digest of the manifest main attributes does not match")]
    MainAttributesMismatch(DigestAlgorithm),

    #[error("manifest bytes are no longer available")]
    ManifestReleased,
}

/// Checks signature files against one manifest.
#[derive(Debug)]
pub struct SignatureFileVerifier<'a> {
    config: &'a VerifierConfig,
}

impl<'a> SignatureFileVerifier<'a> {
    pub fn new(config: &'a VerifierConfig) -> Self {
        Self { config }
    }

    /// Names of the entries whose manifest sections `sf_bytes` vouches for.
    pub fn covered_entries(
        &self,
        sf_name: &str,
        sf_bytes: &[u8],
        digester: &mut ManifestDigester,
    ) -> Result<Vec<String>, SignatureFileError> {
        let sf = Manifest::parse_with_limit(sf_bytes, self.config.max_line_length)?;

        let whole = self.manifest_digest_matches(sf_name, &sf, digester);
        if !whole {
            self.check_main_attributes(sf_name, &sf, digester)?;
        }

        let mut covered = Vec::with_capacity(sf.entries().len());
        for (raw_name, attrs) in sf.entries() {
            let name = normalize_entry_name(raw_name);
            if whole {
                covered.push(name.to_string());
                continue;
            }

            let digests: Vec<_> = declared_digests(attrs)
                .into_iter()
                .filter(|(alg, _)| self.config.permits(*alg))
                .collect();
            if digests.is_empty() {
                debug!("{}: no usable digest for section {}", sf_name, name);
                continue;
            }

            let mut verified = true;
            for (alg, expected) in &digests {
                match digester.digest_range(name, *alg) {
                    Some(actual) if actual == *expected => {}
                    Some(_) => {
                        warn!("{}: {} digest mismatch for section {}", sf_name, alg, name);
                        verified = false;
                        break;
                    }
                    None => {
                        debug!("{}: manifest has no section {}", sf_name, name);
                        verified = false;
                        break;
                    }
                }
            }
            if verified {
                covered.push(name.to_string());
            }
        }

        debug!(
            "{}: {} of {} sections accepted{}",
            sf_name,
            covered.len(),
            sf.entries().len(),
            if whole { " via whole-manifest digest" } else { "" }
        );
        Ok(covered)
    }

    /// True when any usable `<ALG>-Digest-Manifest` matches.
    fn manifest_digest_matches(
        &self,
        sf_name: &str,
        sf: &Manifest,
        digester: &mut ManifestDigester,
    ) -> bool {
        for (alg, expected) in self.main_digests(sf, DigestKey::Manifest) {
            match digester.manifest_digest(alg) {
                Some(actual) if actual == expected => return true,
                Some(_) => debug!(
                    "{}: {} whole-manifest digest differs, checking sections",
                    sf_name, alg
                ),
                None => return false,
            }
        }
        false
    }

    fn check_main_attributes(
        &self,
        sf_name: &str,
        sf: &Manifest,
        digester: &mut ManifestDigester,
    ) -> Result<(), SignatureFileError> {
        for (alg, expected) in self.main_digests(sf, DigestKey::MainAttributes) {
            let actual = digester
                .digest_range(MAIN_ATTRIBUTES, alg)
                .ok_or(SignatureFileError::ManifestReleased)?;
            if actual != expected {
                warn!("{}: main attributes changed since signing", sf_name);
                return Err(SignatureFileError::MainAttributesMismatch(alg));
            }
        }
        Ok(())
    }

    fn main_digests(&self, sf: &Manifest, kind: DigestKey) -> Vec<(DigestAlgorithm, Vec<u8>)> {
        let mut digests = Vec::new();
        for (key, value) in sf.main_attributes().iter() {
            let Some((found, alg_name)) = classify_digest_key(key.as_str()) else {
                continue;
            };
            if found != kind {
                continue;
            }
            let Some(alg) = DigestAlgorithm::from_name(alg_name) else {
                continue;
            };
            if !self.config.permits(alg) {
                debug!("ignoring disabled algorithm {} in {}", alg, key.as_str());
                continue;
            }
            if let Ok(bytes) = STANDARD.decode(value.trim()) {
                digests.push((alg, bytes));
            }
        }
        digests
    }
}

/// Drop a leading `./` or `/` from a signature file section name.
pub fn normalize_entry_name(name: &str) -> &str {
    name.strip_prefix("./")
        .or_else(|| name.strip_prefix('/'))
        .unwrap_or(name)
}
