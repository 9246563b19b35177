//! The manifest model and its line-oriented wire format.
//!
//! A manifest is a main-attributes block followed by zero or more entry
//! blocks, separated by blank lines. Long headers are folded onto
//! continuation lines that start with a single space.

use std::collections::BTreeMap;
use std::io::Write;

use base64::Engine;
use log::debug;

use crate::algorithm::{classify_digest_key, DigestAlgorithm, DigestKey};
use crate::attributes::{validate_value, AttributeName, Attributes};
use crate::error::{ManifestError, ManifestResult};
use crate::lines::{is_name_header, Lines};

/// Default limit on a physical line, terminator included.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 512;

/// Maximum length of a written physical line, `CRLF` included.
pub const LINE_WIDTH: usize = 72;

const CRLF: &[u8] = b"\r\n";

/// In-memory representation of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    main: Attributes,
    entries: BTreeMap<String, Attributes>,
}

/// A logical header being accumulated across continuation lines.
struct PendingHeader {
    raw: Vec<u8>,
    line: usize,
}

enum Section {
    Main,
    /// Between blocks, waiting for the next `Name:` line.
    Between,
    Entry {
        name: Option<String>,
        attrs: Attributes,
    },
}

impl Manifest {
    /// An empty manifest with `Manifest-Version: 1.0`.
    pub fn new() -> Self {
        let mut manifest = Self::default();
        manifest
            .main
            .insert(AttributeName::known(AttributeName::MANIFEST_VERSION), "1.0");
        manifest
    }

    /// Parse with the default line-length limit.
    pub fn parse(bytes: &[u8]) -> ManifestResult<Self> {
        Self::parse_with_limit(bytes, DEFAULT_MAX_LINE_LENGTH)
    }

    /// Parse raw manifest bytes.
    ///
    /// `max_line_len` bounds each physical line including its terminator.
    pub fn parse_with_limit(bytes: &[u8], max_line_len: usize) -> ManifestResult<Self> {
        let mut manifest = Self::default();
        let mut section = Section::Main;
        let mut pending: Option<PendingHeader> = None;

        for line in Lines::new(bytes) {
            if line.len() > max_line_len {
                return Err(ManifestError::LineTooLong {
                    line: line.number,
                    limit: max_line_len,
                });
            }
            if !line.is_terminated() {
                return Err(ManifestError::UnterminatedLine { line: line.number });
            }
            let content = line.content(bytes);

            if line.is_blank() {
                if let Some(header) = pending.take() {
                    manifest.apply_header(&mut section, header)?;
                }
                section = match section {
                    Section::Entry { name, attrs } => {
                        manifest.commit_entry(name, attrs);
                        Section::Between
                    }
                    Section::Main | Section::Between => Section::Between,
                };
                continue;
            }

            if line.is_continuation(bytes) {
                match pending.as_mut() {
                    Some(header) => header.raw.extend_from_slice(&content[1..]),
                    None => {
                        return Err(ManifestError::MisplacedContinuation { line: line.number })
                    }
                }
                continue;
            }

            if let Some(header) = pending.take() {
                manifest.apply_header(&mut section, header)?;
            }

            if let Section::Between = section {
                if !is_name_header(content) {
                    return Err(ManifestError::MissingName { line: line.number });
                }
                section = Section::Entry {
                    name: None,
                    attrs: Attributes::new(),
                };
            }
            pending = Some(PendingHeader {
                raw: content.to_vec(),
                line: line.number,
            });
        }

        if let Some(header) = pending.take() {
            manifest.apply_header(&mut section, header)?;
        }
        if let Section::Entry { name, attrs } = section {
            manifest.commit_entry(name, attrs);
        }
        Ok(manifest)
    }

    fn apply_header(&mut self, section: &mut Section, header: PendingHeader) -> ManifestResult<()> {
        let sep = header
            .raw
            .windows(2)
            .position(|w| w == b": ")
            .ok_or(ManifestError::InvalidHeader { line: header.line })?;
        let name = std::str::from_utf8(&header.raw[..sep])
            .map_err(|_| ManifestError::InvalidHeader { line: header.line })?;
        let name = AttributeName::new(name)?;
        let value = String::from_utf8(header.raw[sep + 2..].to_vec())
            .map_err(|_| ManifestError::InvalidUtf8 { line: header.line })?;

        match section {
            Section::Main => {
                self.main.insert(name, value);
            }
            Section::Entry {
                name: entry_name,
                attrs,
            } => {
                if entry_name.is_none() {
                    // The first header of an entry block is its Name.
                    *entry_name = Some(value);
                } else {
                    attrs.insert(name, value);
                }
            }
            Section::Between => return Err(ManifestError::MissingName { line: header.line }),
        }
        Ok(())
    }

    fn commit_entry(&mut self, name: Option<String>, attrs: Attributes) {
        let Some(name) = name else { return };
        match self.entries.get_mut(&name) {
            Some(existing) => {
                debug!("manifest entry {:?} declared more than once; merging", name);
                existing.extend_from(attrs);
            }
            None => {
                self.entries.insert(name, attrs);
            }
        }
    }

    pub fn main_attributes(&self) -> &Attributes {
        &self.main
    }

    pub fn main_attributes_mut(&mut self) -> &mut Attributes {
        &mut self.main
    }

    /// Attributes declared for `name`, if the manifest has a block for it.
    pub fn attributes(&self, name: &str) -> Option<&Attributes> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> &BTreeMap<String, Attributes> {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut BTreeMap<String, Attributes> {
        &mut self.entries
    }

    /// Digests declared for `name` via `<ALG>-Digest` attributes.
    ///
    /// Unsupported algorithms and undecodable values are skipped.
    pub fn entry_digests(&self, name: &str) -> Vec<(DigestAlgorithm, Vec<u8>)> {
        self.entries
            .get(name)
            .map(declared_digests)
            .unwrap_or_default()
    }

    /// Serialize into `out`.
    pub fn write<W: Write>(&self, out: &mut W) -> ManifestResult<()> {
        let version = [AttributeName::MANIFEST_VERSION, AttributeName::SIGNATURE_VERSION]
            .into_iter()
            .find_map(|key| self.main.get(key).map(|v| (key, v)))
            .ok_or(ManifestError::MissingVersion)?;

        write_header(out, version.0, version.1)?;
        for (name, value) in self.main.iter() {
            if !name.matches(version.0) {
                write_header(out, name.as_str(), value)?;
            }
        }
        out.write_all(CRLF)?;

        for (entry, attrs) in &self.entries {
            write_header(out, AttributeName::NAME, entry)?;
            for (name, value) in attrs.iter() {
                write_header(out, name.as_str(), value)?;
            }
            out.write_all(CRLF)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> ManifestResult<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }
}

/// Decode the `<ALG>-Digest` attributes of one attribute block.
pub fn declared_digests(attrs: &Attributes) -> Vec<(DigestAlgorithm, Vec<u8>)> {
    let mut digests = Vec::new();
    for (key, value) in attrs.iter() {
        let Some((DigestKey::Entry, alg_name)) = classify_digest_key(key.as_str()) else {
            continue;
        };
        let Some(alg) = DigestAlgorithm::from_name(alg_name) else {
            debug!("skipping unsupported digest algorithm {}", alg_name);
            continue;
        };
        match base64::engine::general_purpose::STANDARD.decode(value.trim()) {
            Ok(bytes) => digests.push((alg, bytes)),
            Err(e) => debug!("skipping undecodable {}: {}", key, e),
        }
    }
    digests
}

/// Write one `Name: value` header, folded to [`LINE_WIDTH`].
///
/// Values carrying line breaks are refused; they would start new headers
/// or sections when read back.
fn write_header<W: Write>(out: &mut W, name: &str, value: &str) -> ManifestResult<()> {
    validate_value(value)?;
    let line = format!("{}: {}", name, value);
    let max = LINE_WIDTH - CRLF.len();
    let mut rest = line.as_str();
    let mut first = true;
    loop {
        let budget = if first { max } else { max - 1 };
        if rest.len() <= budget {
            if !first {
                out.write_all(b" ")?;
            }
            out.write_all(rest.as_bytes())?;
            out.write_all(CRLF)?;
            return Ok(());
        }
        let mut cut = budget;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if !first {
            out.write_all(b" ")?;
        }
        out.write_all(rest[..cut].as_bytes())?;
        out.write_all(CRLF)?;
        rest = &rest[cut..];
        first = false;
    }
}
