//! Per-entry verification state.

use jarsig_manifest::{DigestAlgorithm, DigestContext};

/// Where an entry stands in the verification process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPhase {
    /// Metadata read while signature files are still being collected.
    ParsingMeta,
    /// A signature file or block being buffered.
    ParsingBlockOrSf,
    /// An ordinary entry whose bytes are being digested.
    ParsingOrdinary,
    /// Nothing to do for this entry, or its result is already recorded.
    Done,
}

#[derive(Debug)]
pub(crate) struct PendingDigest {
    pub(crate) context: DigestContext,
    pub(crate) expected: Vec<u8>,
}

impl PendingDigest {
    pub(crate) fn new(alg: DigestAlgorithm, expected: Vec<u8>) -> Self {
        Self {
            context: alg.context(),
            expected,
        }
    }

    pub(crate) fn matches(self) -> bool {
        self.context.finalize() == self.expected
    }
}

#[derive(Debug)]
pub(crate) enum EntryState {
    Meta,
    BlockOrSf(Vec<u8>),
    Ordinary(Vec<PendingDigest>),
    Done,
}

/// Accumulates one entry's bytes between
/// [`JarVerifier::begin_entry`](super::JarVerifier::begin_entry) and
/// [`JarVerifier::process_entry`](super::JarVerifier::process_entry).
#[derive(Debug)]
pub struct EntryVerifier {
    pub(crate) name: String,
    pub(crate) state: EntryState,
}

impl EntryVerifier {
    pub(crate) fn new(name: &str, state: EntryState) -> Self {
        Self {
            name: name.to_string(),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> EntryPhase {
        match self.state {
            EntryState::Meta => EntryPhase::ParsingMeta,
            EntryState::BlockOrSf(_) => EntryPhase::ParsingBlockOrSf,
            EntryState::Ordinary(_) => EntryPhase::ParsingOrdinary,
            EntryState::Done => EntryPhase::Done,
        }
    }

    /// Feed bytes; returns how many were digested or buffered.
    pub(crate) fn update(&mut self, data: &[u8]) -> usize {
        match &mut self.state {
            EntryState::BlockOrSf(buf) => {
                buf.extend_from_slice(data);
                data.len()
            }
            EntryState::Ordinary(digests) => {
                for pending in digests.iter_mut() {
                    pending.context.update(data);
                }
                data.len()
            }
            EntryState::Meta | EntryState::Done => 0,
        }
    }

    pub(crate) fn take_state(&mut self) -> EntryState {
        std::mem::replace(&mut self.state, EntryState::Done)
    }
}
