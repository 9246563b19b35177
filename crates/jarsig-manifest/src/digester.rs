//! Digests over the raw byte ranges of manifest sections.
//!
//! Signature files declare digests of the manifest's main section and of
//! each entry section as they were laid out by the signer. Those digests
//! must be computed over the original bytes, never over a re-serialized
//! manifest, so this type works directly on the raw buffer.

use std::collections::HashMap;

use log::debug;

use crate::algorithm::DigestAlgorithm;
use crate::lines::{is_name_header, Line, Lines};

/// Reserved section name addressing the main attributes.
pub const MAIN_ATTRIBUTES: &str = "Manifest-Main-Attributes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectionRange {
    start: usize,
    end: usize,
}

/// Section digests computed once per `(section, algorithm)` pair.
#[derive(Debug)]
pub struct ManifestDigester {
    raw: Option<Vec<u8>>,
    sections: Option<HashMap<String, Vec<SectionRange>>>,
    cache: HashMap<(String, DigestAlgorithm), Vec<u8>>,
    whole: HashMap<DigestAlgorithm, Vec<u8>>,
}

impl ManifestDigester {
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: Some(raw.into()),
            sections: None,
            cache: HashMap::new(),
            whole: HashMap::new(),
        }
    }

    /// Digest of one logical section.
    ///
    /// `section` is an entry name, or [`MAIN_ATTRIBUTES`] for the main
    /// section. Returns `None` when the manifest has no such section, or
    /// when the raw bytes were released before this pair was computed.
    pub fn digest_range(&mut self, section: &str, alg: DigestAlgorithm) -> Option<Vec<u8>> {
        let key = (section.to_string(), alg);
        if let Some(digest) = self.cache.get(&key) {
            return Some(digest.clone());
        }

        self.locate_sections();
        let raw = self.raw.as_ref()?;
        let ranges = self.sections.as_ref()?.get(section)?;
        let mut ctx = alg.context();
        for range in ranges {
            ctx.update(&raw[range.start..range.end]);
        }
        let digest = ctx.finalize();
        self.cache.insert(key, digest.clone());
        Some(digest)
    }

    /// Digest of the entire manifest.
    pub fn manifest_digest(&mut self, alg: DigestAlgorithm) -> Option<Vec<u8>> {
        if let Some(digest) = self.whole.get(&alg) {
            return Some(digest.clone());
        }
        let digest = alg.digest(self.raw.as_ref()?);
        self.whole.insert(alg, digest.clone());
        Some(digest)
    }

    /// Whether the manifest has a section for `name`.
    pub fn has_section(&mut self, name: &str) -> bool {
        self.locate_sections();
        self.sections
            .as_ref()
            .map_or(false, |sections| sections.contains_key(name))
    }

    /// Names of all named entry sections, in no particular order.
    pub fn section_names(&mut self) -> Vec<String> {
        self.locate_sections();
        self.sections
            .as_ref()
            .map(|sections| {
                sections
                    .keys()
                    .filter(|name| name.as_str() != MAIN_ATTRIBUTES)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Byte length of the main section, trailing blank lines included.
    pub fn main_section_len(&mut self) -> Option<usize> {
        self.locate_sections();
        self.sections
            .as_ref()?
            .get(MAIN_ATTRIBUTES)?
            .first()
            .map(|range| range.end - range.start)
    }

    /// Drop the raw manifest bytes; previously computed digests stay available.
    pub fn release(&mut self) {
        if self.raw.take().is_some() {
            debug!(
                "released manifest bytes with {} cached section digests",
                self.cache.len()
            );
        }
        self.sections = None;
    }

    pub fn is_released(&self) -> bool {
        self.raw.is_none()
    }

    fn locate_sections(&mut self) {
        if self.sections.is_some() {
            return;
        }
        let Some(raw) = self.raw.as_ref() else { return };
        self.sections = Some(locate_sections(raw));
    }
}

/// Split `raw` into sections.
///
/// A section starts at the first non-blank line after a blank line and
/// runs up to the start of the next section, so the blank separator lines
/// belong to the section they terminate.
fn locate_sections(raw: &[u8]) -> HashMap<String, Vec<SectionRange>> {
    let lines: Vec<Line> = Lines::new(raw).collect();
    let mut sections: HashMap<String, Vec<SectionRange>> = HashMap::new();
    let mut current: (Option<String>, usize) = (Some(MAIN_ATTRIBUTES.to_string()), 0);
    let mut after_blank = false;

    for (idx, line) in lines.iter().enumerate() {
        if line.is_blank() {
            after_blank = true;
            continue;
        }
        if !after_blank {
            continue;
        }
        after_blank = false;

        let (name, start) = std::mem::replace(&mut current, (None, line.start));
        if let Some(name) = name {
            sections.entry(name).or_default().push(SectionRange {
                start,
                end: line.start,
            });
        }

        let content = line.content(raw);
        if is_name_header(content) {
            let mut name = content[6..].to_vec();
            for next in lines[idx + 1..]
                .iter()
                .take_while(|l| l.is_continuation(raw))
            {
                name.extend_from_slice(&next.content(raw)[1..]);
            }
            match String::from_utf8(name) {
                Ok(name) => current.0 = Some(name),
                Err(_) => debug!("section at offset {} has a non-UTF-8 name", line.start),
            }
        } else {
            debug!("section at offset {} has no Name header", line.start);
        }
    }

    let (name, start) = current;
    if let Some(name) = name {
        sections.entry(name).or_default().push(SectionRange {
            start,
            end: raw.len(),
        });
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: &[u8] = b"Manifest-Version: 1.0\r\nCreated-By: test\r\n\r\n";
    const ENTRY_A: &[u8] = b"Name: a.class\r\nSHA-256-Digest: AAAA\r\n\r\n";
    const ENTRY_B: &[u8] = b"Name: dir/\r\n b.class\r\nSHA-256-Digest: BBBB\r\n\r\n";

    fn sample() -> Vec<u8> {
        [MAIN, ENTRY_A, ENTRY_B].concat()
    }

    #[test]
    fn test_main_section_digest() {
        let mut digester = ManifestDigester::new(sample());
        let alg = DigestAlgorithm::Sha256;
        assert_eq!(
            digester.digest_range(MAIN_ATTRIBUTES, alg),
            Some(alg.digest(MAIN))
        );
        assert_eq!(digester.main_section_len(), Some(MAIN.len()));
    }

    #[test]
    fn test_entry_section_digests() {
        let mut digester = ManifestDigester::new(sample());
        let alg = DigestAlgorithm::Sha1;
        assert_eq!(digester.digest_range("a.class", alg), Some(alg.digest(ENTRY_A)));
        // continued Name header is unwrapped for lookup
        assert_eq!(
            digester.digest_range("dir/b.class", alg),
            Some(alg.digest(ENTRY_B))
        );
        assert_eq!(digester.digest_range("missing.class", alg), None);
    }

    #[test]
    fn test_whole_manifest_digest() {
        let raw = sample();
        let mut digester = ManifestDigester::new(raw.clone());
        assert_eq!(
            digester.manifest_digest(DigestAlgorithm::Sha512),
            Some(DigestAlgorithm::Sha512.digest(&raw))
        );
    }

    #[test]
    fn test_extra_blank_lines_belong_to_preceding_section() {
        let blank: &[u8] = b"\r\n";
        let raw = [MAIN, blank, ENTRY_A].concat();
        let mut digester = ManifestDigester::new(raw);
        let alg = DigestAlgorithm::Sha256;
        let expected_main = [MAIN, blank].concat();
        assert_eq!(
            digester.digest_range(MAIN_ATTRIBUTES, alg),
            Some(alg.digest(&expected_main))
        );
        assert_eq!(digester.digest_range("a.class", alg), Some(alg.digest(ENTRY_A)));
    }

    #[test]
    fn test_repeated_name_digests_all_sections() {
        let second: &[u8] = b"Name: a.class\r\nExtra: 1\r\n\r\n";
        let raw = [MAIN, ENTRY_A, second].concat();
        let mut digester = ManifestDigester::new(raw);
        let alg = DigestAlgorithm::Sha256;
        let expected = [ENTRY_A, second].concat();
        assert_eq!(digester.digest_range("a.class", alg), Some(alg.digest(&expected)));
    }

    #[test]
    fn test_release_keeps_cached_digests() {
        let mut digester = ManifestDigester::new(sample());
        let alg = DigestAlgorithm::Sha256;
        let cached = digester.digest_range("a.class", alg).unwrap();
        digester.release();
        assert!(digester.is_released());
        assert_eq!(digester.digest_range("a.class", alg), Some(cached));
        // never computed before release
        assert_eq!(digester.digest_range("a.class", DigestAlgorithm::Sha1), None);
        assert_eq!(digester.manifest_digest(alg), None);
    }

    #[test]
    fn test_section_names() {
        let mut digester = ManifestDigester::new(sample());
        let mut names = digester.section_names();
        names.sort();
        assert_eq!(names, vec!["a.class".to_string(), "dir/b.class".to_string()]);
        assert!(digester.has_section("a.class"));
        assert!(digester.has_section(MAIN_ATTRIBUTES));
    }

    #[test]
    fn test_manifest_without_entries() {
        let mut digester = ManifestDigester::new(MAIN.to_vec());
        let alg = DigestAlgorithm::Sha256;
        assert_eq!(digester.digest_range(MAIN_ATTRIBUTES, alg), Some(alg.digest(MAIN)));
        assert!(digester.section_names().is_empty());
    }
}
