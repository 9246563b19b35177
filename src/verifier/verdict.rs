//! Per-entry verification outcomes.

use std::fmt;
use std::sync::Arc;

use jarsig_block::SignerRecord;

/// An unordered, duplicate-free set of signers.
///
/// Sets compare by content, so entries signed by the same combination of
/// signers map to equal sets regardless of discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignerSet(Arc<[SignerRecord]>);

impl SignerSet {
    pub fn new(mut signers: Vec<SignerRecord>) -> Self {
        signers.sort();
        signers.dedup();
        Self(signers.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, signer: &SignerRecord) -> bool {
        self.0.binary_search(signer).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignerRecord> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[SignerRecord] {
        &self.0
    }
}

impl fmt::Display for SignerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, signer) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", signer)?;
        }
        Ok(())
    }
}

/// Outcome of verifying one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryVerdict {
    /// Every declared digest matched and these signers cover the entry.
    Signed(SignerSet),
    /// Not covered by any valid signature, or tampered with.
    Unsigned,
}

impl EntryVerdict {
    pub fn is_signed(&self) -> bool {
        matches!(self, EntryVerdict::Signed(_))
    }

    pub fn signers(&self) -> Option<&SignerSet> {
        match self {
            EntryVerdict::Signed(signers) => Some(signers),
            EntryVerdict::Unsigned => None,
        }
    }
}
