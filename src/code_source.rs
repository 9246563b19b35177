//! Mapping archive entries to code sources.
//!
//! A code source pairs the archive location with the set of signers that
//! vouch for an entry. Entries signed by the same combination of signers
//! share a code source; everything else falls into the unsigned one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::verifier::{JarVerifier, SignerSet};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeSource {
    location: String,
    signers: Option<SignerSet>,
}

impl CodeSource {
    pub fn new(location: impl Into<String>, signers: Option<SignerSet>) -> Self {
        Self {
            location: location.into(),
            signers,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn signers(&self) -> Option<&SignerSet> {
        self.signers.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signers.is_some()
    }
}

impl fmt::Display for CodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.signers {
            Some(signers) => write!(f, "{} [{}]", self.location, signers),
            None => write!(f, "{} [unsigned]", self.location),
        }
    }
}

/// Derives code sources for the entries of one archive.
#[derive(Debug, Clone)]
pub struct CodeSourceMapper {
    location: String,
    verifier: Option<Arc<JarVerifier>>,
}

impl CodeSourceMapper {
    /// `verifier` is `None` for archives without signatures.
    pub fn new(location: impl Into<String>, verifier: Option<Arc<JarVerifier>>) -> Self {
        Self {
            location: location.into(),
            verifier,
        }
    }

    pub fn unsigned(&self) -> CodeSource {
        CodeSource::new(self.location.clone(), None)
    }

    /// Code source of `name` based on its verdict so far.
    ///
    /// An entry that has not been fully read yet maps to the unsigned code
    /// source.
    pub fn code_source(&self, name: &str) -> CodeSource {
        let signers = self
            .verifier
            .as_ref()
            .and_then(|verifier| verifier.code_signers(name));
        CodeSource::new(self.location.clone(), signers)
    }

    /// Every code source the archive can produce: one per distinct signer
    /// set, followed by the unsigned one.
    pub fn code_sources(&self) -> Vec<CodeSource> {
        let mut sets: Vec<SignerSet> = Vec::new();
        if let Some(verifier) = &self.verifier {
            sets.extend(verifier.declared_signer_sets());
            sets.extend(
                verifier
                    .verdicts()
                    .into_values()
                    .filter_map(|verdict| verdict.signers().cloned()),
            );
        }
        sets.sort();
        sets.dedup();

        let mut sources: Vec<CodeSource> = sets
            .into_iter()
            .map(|set| CodeSource::new(self.location.clone(), Some(set)))
            .collect();
        sources.push(self.unsigned());
        sources
    }

    /// Those of `names` that map to `source`.
    pub fn entries_for<'a, I>(&self, source: &CodeSource, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter(|name| self.code_source(name) == *source)
            .map(str::to_string)
            .collect()
    }

    /// Group `names` by code source.
    pub fn partition<'a, I>(&self, names: I) -> Vec<(CodeSource, Vec<String>)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut groups: BTreeMap<Option<SignerSet>, Vec<String>> = BTreeMap::new();
        for name in names {
            let source = self.code_source(name);
            groups
                .entry(source.signers)
                .or_default()
                .push(name.to_string());
        }
        groups
            .into_iter()
            .map(|(signers, names)| (CodeSource::new(self.location.clone(), signers), names))
            .collect()
    }
}
