//! Signed archive access.
//!
//! [`SignedArchive`] ties an [`EntrySource`] (anything that can list and
//! open entries) to a [`JarVerifier`]: opening the archive reads the
//! manifest and all metadata, after which every entry read through
//! [`SignedArchive::read_entry`] is verified as it streams.

mod directory;
mod memory;
mod report;

use std::io::{self, Read};
use std::sync::Arc;

use jarsig_block::BlockParser;
use jarsig_manifest::Manifest;
use log::{debug, info, warn};
use thiserror::Error;

use crate::code_source::{CodeSource, CodeSourceMapper};
use crate::config::VerifierConfig;
use crate::names;
use crate::stream::VerifierStream;
use crate::verifier::{EntryVerdict, JarVerifier};

pub use directory::DirectorySource;
pub use memory::MemorySource;
pub use report::{
    EntryReport, EntryStatus, ExitCode, ReportSummary, SignerSummary, VerificationReport,
    REPORT_SCHEMA_VERSION,
};

/// One entry as listed by its container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub is_directory: bool,
    /// Uncompressed size, when the container records it
    pub declared_size: Option<u64>,
}

impl ArchiveEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            declared_size: Some(size),
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            declared_size: Some(0),
        }
    }
}

/// A container of archive entries.
pub trait EntrySource: Send + Sync {
    /// Entries in archive order.
    fn entries(&self) -> io::Result<Vec<ArchiveEntry>>;

    /// Open the raw bytes of a non-directory entry.
    fn open<'a>(&'a self, name: &str) -> io::Result<Box<dyn Read + Send + 'a>>;

    /// Location used for code sources and reports.
    fn location(&self) -> String;
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("{0} is a directory")]
    IsDirectory(String),
}

/// An archive whose entries are verified as they are read.
pub struct SignedArchive<S> {
    source: S,
    entries: Vec<ArchiveEntry>,
    manifest: Option<Manifest>,
    verifier: Option<Arc<JarVerifier>>,
}

impl<S: EntrySource> SignedArchive<S> {
    /// Open `source` and process its manifest and signature metadata.
    ///
    /// Archives without a manifest, without signature entries or with an
    /// unparseable manifest open as unsigned.
    pub fn open(
        source: S,
        parser: Arc<dyn BlockParser>,
        config: &VerifierConfig,
    ) -> Result<Self, ArchiveError> {
        let entries = source.entries()?;
        let location = source.location();
        let mut archive = Self {
            source,
            entries,
            manifest: None,
            verifier: None,
        };

        let Some(manifest_entry) = archive
            .entries
            .iter()
            .find(|e| !e.is_directory && names::is_manifest(&e.name))
            .cloned()
        else {
            debug!("{}: no manifest", location);
            return Ok(archive);
        };
        let mut raw = Vec::new();
        archive.source.open(&manifest_entry.name)?.read_to_end(&mut raw)?;

        let has_signatures = archive
            .entries
            .iter()
            .any(|e| !e.is_directory && names::signature_entry_kind(&e.name).is_some());
        if !has_signatures {
            archive.manifest = match Manifest::parse_with_limit(&raw, config.max_line_length) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!("{}: ignoring unparseable manifest: {}", location, e);
                    None
                }
            };
            debug!("{}: no signature entries", location);
            return Ok(archive);
        }

        let verifier = match JarVerifier::new(raw, parser, config) {
            Ok(verifier) => Arc::new(verifier),
            Err(e) => {
                warn!("{}: unparseable manifest, treating as unsigned: {}", location, e);
                return Ok(archive);
            }
        };

        for entry in archive.entries.iter().filter(|e| names::is_meta(&e.name)) {
            if entry.is_directory {
                verifier.process_entry(verifier.begin_entry(entry));
                continue;
            }
            let result = archive.source.open(&entry.name).and_then(|reader| {
                let mut stream = VerifierStream::new(reader, entry, Arc::clone(&verifier));
                io::copy(&mut stream, &mut io::sink())
            });
            if let Err(e) = result {
                warn!("{}: failed to read {}: {}", location, entry.name, e);
            }
        }
        verifier.done_with_meta();

        info!(
            "{}: opened with {} signature blocks verified",
            location,
            verifier.stats().blocks_verified
        );
        archive.manifest = Some(verifier.manifest().clone());
        archive.verifier = Some(verifier);
        Ok(archive)
    }

    pub fn location(&self) -> String {
        self.source.location()
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn verifier(&self) -> Option<&Arc<JarVerifier>> {
        self.verifier.as_ref()
    }

    /// True when at least one signer covers some entry.
    pub fn is_signed(&self) -> bool {
        self.verifier
            .as_ref()
            .map_or(false, |verifier| !verifier.nothing_to_verify())
    }

    /// Open an entry for reading, verifying it when the archive is signed.
    pub fn read_entry(&self, name: &str) -> Result<EntryReader<'_>, ArchiveError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))?;
        if entry.is_directory {
            return Err(ArchiveError::IsDirectory(name.to_string()));
        }
        let reader = self.source.open(name)?;
        Ok(match self.verifier.as_ref().filter(|v| !v.nothing_to_verify()) {
            Some(verifier) => {
                EntryReader::Verified(VerifierStream::new(reader, entry, Arc::clone(verifier)))
            }
            None => EntryReader::Plain(reader),
        })
    }

    /// Verdict for `name` so far.
    pub fn verdict(&self, name: &str) -> EntryVerdict {
        self.verifier
            .as_ref()
            .map_or(EntryVerdict::Unsigned, |verifier| verifier.verdict(name))
    }

    pub fn code_source_mapper(&self) -> CodeSourceMapper {
        CodeSourceMapper::new(self.source.location(), self.verifier.clone())
    }

    pub fn code_source(&self, name: &str) -> CodeSource {
        self.code_source_mapper().code_source(name)
    }

    /// Non-directory entries currently mapped to `source`.
    pub fn entries_for(&self, source: &CodeSource) -> Vec<String> {
        let candidates = self
            .entries
            .iter()
            .filter(|e| !e.is_directory && !names::is_signature_related(&e.name))
            .map(|e| e.name.as_str());
        self.code_source_mapper().entries_for(source, candidates)
    }

    /// Read every ordinary entry to the end and report the outcome.
    pub fn verify_all(&self) -> VerificationReport {
        let mut report = VerificationReport::new(self.source.location(), self.is_signed());

        for entry in &self.entries {
            if entry.is_directory || names::is_signature_related(&entry.name) {
                continue;
            }
            let status = match self.drain(&entry.name) {
                Err(e) => {
                    warn!("{}: {}", entry.name, e);
                    EntryStatus::ReadError {
                        message: e.to_string(),
                    }
                }
                Ok(()) => self.status_of(&entry.name),
            };
            report.push(EntryReport {
                name: entry.name.clone(),
                status,
            });
        }

        info!(
            "{}: {} signed, {} unsigned, {} mismatched, {} unreadable",
            report.location,
            report.summary.signed,
            report.summary.unsigned,
            report.summary.digest_mismatch,
            report.summary.read_errors
        );
        report
    }

    fn drain(&self, name: &str) -> Result<(), ArchiveError> {
        let mut reader = self.read_entry(name)?;
        io::copy(&mut reader, &mut io::sink())?;
        Ok(())
    }

    fn status_of(&self, name: &str) -> EntryStatus {
        let Some(verifier) = &self.verifier else {
            return EntryStatus::Unsigned;
        };
        match verifier.verdict(name) {
            EntryVerdict::Signed(signers) => EntryStatus::Signed {
                signers: signers.iter().map(SignerSummary::from).collect(),
            },
            EntryVerdict::Unsigned => {
                let checked = verifier.recorded_verdict(name).is_some();
                if checked && verifier.declared_signers(name).is_some() {
                    EntryStatus::DigestMismatch
                } else {
                    EntryStatus::Unsigned
                }
            }
        }
    }
}

impl<S> std::fmt::Debug for SignedArchive<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedArchive")
            .field("entries", &self.entries.len())
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

/// Reader returned by [`SignedArchive::read_entry`].
pub enum EntryReader<'a> {
    Plain(Box<dyn Read + Send + 'a>),
    Verified(VerifierStream<Box<dyn Read + Send + 'a>>),
}

impl EntryReader<'_> {
    /// Verdict recorded once the entry has been read to the end.
    pub fn verdict(&self) -> Option<&EntryVerdict> {
        match self {
            EntryReader::Plain(_) => None,
            EntryReader::Verified(stream) => stream.verdict(),
        }
    }
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryReader::Plain(reader) => reader.read(buf),
            EntryReader::Verified(stream) => stream.read(buf),
        }
    }
}
