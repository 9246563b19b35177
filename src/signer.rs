//! Producing signed archives.
//!
//! [`JarSigner`] computes entry digests into the manifest, derives a
//! signature file from the manifest's raw sections, and signs that file
//! with a [`BlockSigner`]. Signing an already signed archive with a new
//! base name adds a signer: unchanged manifests are kept byte for byte so
//! existing signature files stay valid.

use std::io::{self, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jarsig_block::{BlockError, BlockSigner, BLOCK_EXTENSION};
use jarsig_manifest::{
    validate_value, AttributeName, Attributes, Manifest, ManifestDigester, ManifestError,
    MAIN_ATTRIBUTES,
};
use log::{debug, info};
use thiserror::Error;

use crate::archive::{DirectorySource, EntrySource, MemorySource};
use crate::names::{self, MANIFEST_NAME, META_INF};

/// Default signature file base name
pub const DEFAULT_BASE_NAME: &str = "SIGNER";

/// Longest accepted base name
pub const MAX_BASE_NAME_LEN: usize = 8;

const CHUNK: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("signature block error: {0}")]
    Block(#[from] BlockError),

    #[error("invalid signature base name {0:?}: use 1-8 of A-Z, 0-9, '-' or '_'")]
    InvalidBaseName(String),
}

/// Signs archives for one signer.
#[derive(Debug)]
pub struct JarSigner {
    block_signer: BlockSigner,
    base_name: String,
    sign_manifest: bool,
    internal_sf: bool,
    created_by: String,
}

impl JarSigner {
    pub fn new(block_signer: BlockSigner) -> Self {
        Self {
            block_signer,
            base_name: DEFAULT_BASE_NAME.to_string(),
            sign_manifest: true,
            internal_sf: false,
            created_by: format!("jarsig {}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Name the `.SF` and block files `META-INF/<NAME>.*`.
    pub fn base_name(mut self, name: &str) -> Result<Self, SignerError> {
        let valid = !name.is_empty()
            && name.len() <= MAX_BASE_NAME_LEN
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SignerError::InvalidBaseName(name.to_string()));
        }
        self.base_name = name.to_ascii_uppercase();
        Ok(self)
    }

    /// Include the whole-manifest digest in the signature file.
    pub fn sign_manifest(mut self, enabled: bool) -> Self {
        self.sign_manifest = enabled;
        self
    }

    /// Embed the signature file in the block.
    pub fn internal_sf(mut self, enabled: bool) -> Self {
        self.internal_sf = enabled;
        self
    }

    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    pub fn signature_file_name(&self) -> String {
        format!("{}{}.SF", META_INF, self.base_name)
    }

    pub fn block_name(&self) -> String {
        format!("{}{}.{}", META_INF, self.base_name, BLOCK_EXTENSION)
    }

    /// Sign every non-signature entry of `source`.
    pub fn sign(&self, source: &dyn EntrySource) -> Result<SignedOutput, SignerError> {
        let manifest_bytes = self.update_manifest(source)?;
        let signature_file = self.signature_file(&manifest_bytes)?;
        let block = self.block_signer.sign(&signature_file, self.internal_sf)?;

        info!("signed {} as {}", source.location(), self.block_name());
        Ok(SignedOutput {
            files: vec![
                (MANIFEST_NAME.to_string(), manifest_bytes),
                (self.signature_file_name(), signature_file),
                (self.block_name(), block),
            ],
        })
    }

    fn update_manifest(&self, source: &dyn EntrySource) -> Result<Vec<u8>, SignerError> {
        let entries = source.entries()?;
        let alg = self.block_signer.digest_algorithm();
        let key = alg.digest_key();

        let original = match entries
            .iter()
            .find(|e| !e.is_directory && names::is_manifest(&e.name))
        {
            Some(entry) => {
                let mut raw = Vec::new();
                source.open(&entry.name)?.read_to_end(&mut raw)?;
                Some(raw)
            }
            None => None,
        };

        let mut manifest = match &original {
            Some(raw) => Manifest::parse(raw)?,
            None => {
                let mut manifest = Manifest::new();
                manifest
                    .main_attributes_mut()
                    .put(AttributeName::CREATED_BY, self.created_by.as_str())?;
                manifest
            }
        };
        let main_before = manifest.main_attributes().clone();
        let main = manifest.main_attributes_mut();
        if !main.contains(AttributeName::MANIFEST_VERSION) {
            main.insert(AttributeName::known(AttributeName::MANIFEST_VERSION), "1.0");
        }
        let main_changed = main_before != *manifest.main_attributes();

        let mut changed = false;
        for entry in &entries {
            if entry.is_directory || names::is_signature_related(&entry.name) {
                continue;
            }
            // A name with a line break would forge sections of its own.
            validate_value(&entry.name)?;
            let digest = STANDARD.encode(self.digest_entry(source, &entry.name)?);
            let attrs = manifest.entries_mut().entry(entry.name.clone()).or_default();
            if attrs.get(&key) != Some(digest.as_str()) {
                attrs.put(&key, digest)?;
                changed = true;
            }
        }

        let Some(original) = original else {
            return Ok(manifest.to_bytes()?);
        };
        if !changed && !main_changed {
            debug!("manifest unchanged, keeping original bytes");
            return Ok(original);
        }
        let rewritten = manifest.to_bytes()?;
        if main_changed {
            return Ok(rewritten);
        }
        splice_main_section(&original, rewritten)
    }

    fn digest_entry(&self, source: &dyn EntrySource, name: &str) -> Result<Vec<u8>, SignerError> {
        let mut ctx = self.block_signer.digest_algorithm().context();
        let mut reader = source.open(name)?;
        let mut buf = vec![0u8; CHUNK];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            ctx.update(&buf[..n]);
        }
        Ok(ctx.finalize())
    }

    fn signature_file(&self, manifest_bytes: &[u8]) -> Result<Vec<u8>, SignerError> {
        let alg = self.block_signer.digest_algorithm();
        let manifest = Manifest::parse(manifest_bytes)?;
        let mut digester = ManifestDigester::new(manifest_bytes);

        let mut sf = Manifest::default();
        let main = sf.main_attributes_mut();
        main.put(AttributeName::SIGNATURE_VERSION, "1.0")?;
        main.put(AttributeName::CREATED_BY, self.created_by.as_str())?;
        if self.sign_manifest {
            if let Some(whole) = digester.manifest_digest(alg) {
                main.put(&alg.manifest_digest_key(), STANDARD.encode(whole))?;
            }
        }
        if let Some(digest) = digester.digest_range(MAIN_ATTRIBUTES, alg) {
            main.put(&alg.main_attributes_digest_key(), STANDARD.encode(digest))?;
        }

        for name in manifest.entries().keys() {
            let Some(digest) = digester.digest_range(name, alg) else {
                continue;
            };
            let mut attrs = Attributes::new();
            attrs.put(&alg.digest_key(), STANDARD.encode(digest))?;
            sf.entries_mut().insert(name.clone(), attrs);
        }
        Ok(sf.to_bytes()?)
    }
}

/// Keep the original main section bytes ahead of rewritten entry sections.
fn splice_main_section(original: &[u8], rewritten: Vec<u8>) -> Result<Vec<u8>, SignerError> {
    let old_len = ManifestDigester::new(original).main_section_len();
    let new_len = ManifestDigester::new(rewritten.as_slice()).main_section_len();
    let (Some(old_len), Some(new_len)) = (old_len, new_len) else {
        return Ok(rewritten);
    };

    let mut out = original[..old_len].to_vec();
    let ends_blank =
        out.ends_with(b"\r\n\r\n") || out.ends_with(b"\n\n") || out.ends_with(b"\r\r");
    if !ends_blank {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(&rewritten[new_len..]);
    Ok(out)
}

/// Metadata files produced by [`JarSigner::sign`].
#[derive(Debug, Clone)]
pub struct SignedOutput {
    files: Vec<(String, Vec<u8>)>,
}

impl SignedOutput {
    /// Manifest, signature file and block, in that order.
    pub fn files(&self) -> &[(String, Vec<u8>)] {
        &self.files
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    pub fn manifest(&self) -> &[u8] {
        self.get(MANIFEST_NAME).unwrap_or_default()
    }

    /// Write the metadata files into an exploded archive.
    pub fn write_to_dir(&self, dir: &DirectorySource) -> io::Result<()> {
        for (name, data) in &self.files {
            dir.write_entry(name, data)?;
        }
        Ok(())
    }

    /// Copy `source` with the new metadata in front, the way jar tools lay
    /// out signed archives.
    pub fn apply(&self, source: &dyn EntrySource) -> io::Result<MemorySource> {
        let original = MemorySource::from_source(source)?;
        let mut out = MemorySource::with_location(source.location());
        out.add_directory(META_INF);
        for (name, data) in &self.files {
            out.add_file(name.clone(), data.clone());
        }
        for entry in original.entries()? {
            if entry.name.eq_ignore_ascii_case(META_INF) {
                continue;
            }
            if self
                .files
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case(&entry.name))
            {
                continue;
            }
            if entry.is_directory {
                out.add_directory(entry.name);
            } else if let Some(data) = original.get(&entry.name) {
                out.add_file(entry.name.clone(), data.to_vec());
            }
        }
        Ok(out)
    }
}
