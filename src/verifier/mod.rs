//! Streaming signature verification for one archive.
//!
//! A [`JarVerifier`] is created from the raw manifest bytes and then sees
//! every entry the archive reader hands out, in archive order:
//!
//! 1. While metadata is being read, signature files and signature blocks
//!    are buffered. A block is checked as soon as its `.SF` is available
//!    (embedded or read earlier); otherwise it waits until the `.SF` shows
//!    up. Each verified block yields the entry names its signer covers.
//! 2. The first entry outside `META-INF/` (or an explicit
//!    [`done_with_meta`](JarVerifier::done_with_meta)) ends the metadata
//!    phase. Blocks still waiting are dropped and the manifest bytes are
//!    released.
//! 3. Ordinary entries covered by some signer are digested while they are
//!    read. When the last byte has been seen the digests are compared with
//!    the manifest and a verdict is recorded.
//!
//! Tampering never fails a read; it only produces an unsigned verdict. The
//! first recorded verdict for a name is final.

mod entry;
mod signature_file;
mod verdict;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jarsig_block::{BlockParser, SignatureBlock, SignerRecord};
use jarsig_manifest::{Manifest, ManifestDigester, ManifestResult};
use log::{debug, warn};

use crate::archive::ArchiveEntry;
use crate::config::VerifierConfig;
use crate::names::{self, SignatureEntryKind};

pub use entry::{EntryPhase, EntryVerifier};
pub use signature_file::{normalize_entry_name, SignatureFileError, SignatureFileVerifier};
pub use verdict::{EntryVerdict, SignerSet};

use entry::{EntryState, PendingDigest};

/// Counters describing the work a verifier has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifierStats {
    /// Ordinary entries whose digests were compared
    pub entries_digested: u64,
    /// Bytes fed into entry digests
    pub bytes_digested: u64,
    /// Signature blocks that verified and contributed signers
    pub blocks_verified: u64,
}

#[derive(Debug, Default)]
struct Counters {
    entries_digested: AtomicU64,
    bytes_digested: AtomicU64,
    blocks_verified: AtomicU64,
}

#[derive(Debug)]
struct PendingBlock {
    name: String,
    base: String,
    block: Box<dyn SignatureBlock>,
}

#[derive(Debug)]
struct VerifierState {
    parsing_meta: bool,
    digester: Option<ManifestDigester>,
    /// `.SF` bytes by base name
    sig_file_data: HashMap<String, Vec<u8>>,
    pending_blocks: Vec<PendingBlock>,
    /// Signers collected per entry name during the metadata phase
    sig_file_signers: HashMap<String, Vec<SignerRecord>>,
    /// Signers per entry name once the metadata phase is over
    entry_signers: HashMap<String, SignerSet>,
    verdicts: HashMap<String, EntryVerdict>,
}

/// Verification state for one archive, shared by all of its readers.
pub struct JarVerifier {
    manifest: Manifest,
    parser: Arc<dyn BlockParser>,
    config: VerifierConfig,
    state: Mutex<VerifierState>,
    counters: Counters,
}

impl JarVerifier {
    /// Parse `manifest_bytes` and prepare for the metadata phase.
    pub fn new(
        manifest_bytes: Vec<u8>,
        parser: Arc<dyn BlockParser>,
        config: &VerifierConfig,
    ) -> ManifestResult<Self> {
        let manifest = Manifest::parse_with_limit(&manifest_bytes, config.max_line_length)?;
        debug!(
            "manifest parsed: {} bytes, {} entry sections",
            manifest_bytes.len(),
            manifest.entries().len()
        );
        Ok(Self {
            manifest,
            parser,
            config: config.clone(),
            state: Mutex::new(VerifierState {
                parsing_meta: true,
                digester: Some(ManifestDigester::new(manifest_bytes)),
                sig_file_data: HashMap::new(),
                pending_blocks: Vec::new(),
                sig_file_signers: HashMap::new(),
                entry_signers: HashMap::new(),
                verdicts: HashMap::new(),
            }),
            counters: Counters::default(),
        })
    }

    fn state(&self) -> MutexGuard<'_, VerifierState> {
        // State stays consistent across a panicking reader; keep going.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start reading `entry`.
    pub fn begin_entry(&self, entry: &ArchiveEntry) -> EntryVerifier {
        let name = entry.name.as_str();
        let mut state = self.state();

        if state.parsing_meta {
            if names::is_meta(name) {
                if entry.is_directory {
                    return EntryVerifier::new(name, EntryState::Done);
                }
                if names::signature_entry_kind(name).is_some() {
                    return EntryVerifier::new(name, EntryState::BlockOrSf(Vec::new()));
                }
                return EntryVerifier::new(name, EntryState::Meta);
            }
            self.finish_meta(&mut state);
        }

        if entry.is_directory || state.entry_signers.is_empty() {
            return EntryVerifier::new(name, EntryState::Done);
        }
        if state.verdicts.contains_key(name) || !state.entry_signers.contains_key(name) {
            return EntryVerifier::new(name, EntryState::Done);
        }

        let digests: Vec<PendingDigest> = self
            .manifest
            .entry_digests(name)
            .into_iter()
            .filter(|(alg, _)| self.config.permits(*alg))
            .map(|(alg, expected)| PendingDigest::new(alg, expected))
            .collect();
        if digests.is_empty() {
            debug!("{}: no usable manifest digest", name);
            return EntryVerifier::new(name, EntryState::Done);
        }
        EntryVerifier::new(name, EntryState::Ordinary(digests))
    }

    /// Feed the next chunk of `entry`'s bytes.
    pub fn update(&self, entry: &mut EntryVerifier, data: &[u8]) {
        if let EntryState::Ordinary(_) = entry.state {
            self.counters
                .bytes_digested
                .fetch_add(data.len() as u64, Ordering::Relaxed);
        }
        entry.update(data);
    }

    /// Finish `entry` after its last byte.
    ///
    /// Returns the verdict recorded for an ordinary entry, or `None` when
    /// the entry needed no digest check.
    pub fn process_entry(&self, mut entry: EntryVerifier) -> Option<EntryVerdict> {
        match entry.take_state() {
            EntryState::Meta | EntryState::Done => None,
            EntryState::BlockOrSf(bytes) => {
                let mut state = self.state();
                if state.parsing_meta {
                    self.process_signature_entry(&mut state, &entry.name, bytes);
                } else {
                    debug!("{}: signature entry read after metadata, ignored", entry.name);
                }
                None
            }
            EntryState::Ordinary(digests) => {
                self.counters
                    .entries_digested
                    .fetch_add(1, Ordering::Relaxed);
                let matched = digests.into_iter().all(PendingDigest::matches);

                let mut state = self.state();
                if let Some(existing) = state.verdicts.get(&entry.name) {
                    return Some(existing.clone());
                }
                let verdict = match state.entry_signers.get(&entry.name) {
                    Some(signers) if matched => EntryVerdict::Signed(signers.clone()),
                    _ => {
                        if !matched {
                            warn!("{}: digest does not match the manifest", entry.name);
                        }
                        EntryVerdict::Unsigned
                    }
                };
                state.verdicts.insert(entry.name.clone(), verdict.clone());
                Some(verdict)
            }
        }
    }

    /// End the metadata phase. Idempotent.
    pub fn done_with_meta(&self) {
        let mut state = self.state();
        self.finish_meta(&mut state);
    }

    fn finish_meta(&self, state: &mut VerifierState) {
        if !state.parsing_meta {
            return;
        }
        state.parsing_meta = false;

        for pending in state.pending_blocks.drain(..) {
            warn!(
                "{}: no signature file {}.SF found, block ignored",
                pending.name, pending.base
            );
        }
        state.sig_file_data.clear();
        if let Some(digester) = state.digester.as_mut() {
            digester.release();
        }
        state.digester = None;

        state.entry_signers = std::mem::take(&mut state.sig_file_signers)
            .into_iter()
            .map(|(name, signers)| (name, SignerSet::new(signers)))
            .collect();
        debug!(
            "metadata done: {} signed entry names",
            state.entry_signers.len()
        );
    }

    fn process_signature_entry(&self, state: &mut VerifierState, name: &str, bytes: Vec<u8>) {
        let base = names::signature_base_name(name);
        match names::signature_entry_kind(name) {
            Some(SignatureEntryKind::SignatureFile) => {
                if state.sig_file_data.insert(base.clone(), bytes.clone()).is_some() {
                    debug!("{}: replaces an earlier signature file for {}", name, base);
                }
                let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending_blocks)
                    .into_iter()
                    .partition(|pending| pending.base == base);
                state.pending_blocks = waiting;
                for pending in ready {
                    debug!("{}: signature file arrived", pending.name);
                    self.process_block(state, &pending.name, pending.block.as_ref(), name, &bytes);
                }
            }
            Some(SignatureEntryKind::Block) => {
                let block = match self.parser.parse(name, &bytes) {
                    Ok(block) => block,
                    Err(e) => {
                        warn!("{}: unusable signature block: {}", name, e);
                        return;
                    }
                };
                if !self.config.permits(block.digest_algorithm()) {
                    warn!(
                        "{}: digest algorithm {} is disabled",
                        name,
                        block.digest_algorithm()
                    );
                    return;
                }

                let sf = block
                    .embedded_signature_file()
                    .map(<[u8]>::to_vec)
                    .or_else(|| state.sig_file_data.get(&base).cloned());
                let Some(sf) = sf else {
                    debug!("{}: waiting for {}.SF", name, base);
                    state.pending_blocks.push(PendingBlock {
                        name: name.to_string(),
                        base,
                        block,
                    });
                    return;
                };
                let sf_name = format!("{}.SF", base);
                self.process_block(state, name, block.as_ref(), &sf_name, &sf);
            }
            None => {}
        }
    }

    fn process_block(
        &self,
        state: &mut VerifierState,
        block_name: &str,
        block: &dyn SignatureBlock,
        sf_name: &str,
        sf: &[u8],
    ) {
        let signer = match block.verify(sf) {
            Ok(signer) => signer,
            Err(e) => {
                warn!("{}: signature does not verify: {}", block_name, e);
                return;
            }
        };
        let Some(digester) = state.digester.as_mut() else {
            return;
        };
        let sf_verifier = SignatureFileVerifier::new(&self.config);
        let covered = match sf_verifier.covered_entries(sf_name, sf, digester) {
            Ok(covered) => covered,
            Err(e) => {
                warn!("{}: {}", sf_name, e);
                return;
            }
        };

        self.counters
            .blocks_verified
            .fetch_add(1, Ordering::Relaxed);
        debug!(
            "{}: {} covers {} entries",
            block_name,
            signer,
            covered.len()
        );
        for entry in covered {
            let signers = state.sig_file_signers.entry(entry).or_default();
            if !signers.contains(&signer) {
                signers.push(signer.clone());
            }
        }
    }

    /// Verdict for `name`; entries never verified are unsigned.
    pub fn verdict(&self, name: &str) -> EntryVerdict {
        self.recorded_verdict(name)
            .unwrap_or(EntryVerdict::Unsigned)
    }

    /// Verdict for `name` if one was recorded.
    pub fn recorded_verdict(&self, name: &str) -> Option<EntryVerdict> {
        self.state().verdicts.get(name).cloned()
    }

    /// All recorded verdicts.
    pub fn verdicts(&self) -> HashMap<String, EntryVerdict> {
        self.state().verdicts.clone()
    }

    /// Signers of a fully read, untampered entry.
    pub fn code_signers(&self, name: &str) -> Option<SignerSet> {
        self.verdict(name).signers().cloned()
    }

    /// Signers whose signature files cover `name`, before its bytes are
    /// checked. Empty until the metadata phase is over.
    pub fn declared_signers(&self, name: &str) -> Option<SignerSet> {
        self.state().entry_signers.get(name).cloned()
    }

    /// Distinct signer sets declared for any entry.
    pub fn declared_signer_sets(&self) -> Vec<SignerSet> {
        let state = self.state();
        let mut sets: Vec<SignerSet> = state.entry_signers.values().cloned().collect();
        sets.sort();
        sets.dedup();
        sets
    }

    /// True once metadata is done and no signer covers any entry.
    pub fn nothing_to_verify(&self) -> bool {
        let state = self.state();
        !state.parsing_meta && state.entry_signers.is_empty()
    }

    pub fn is_parsing_meta(&self) -> bool {
        self.state().parsing_meta
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn stats(&self) -> VerifierStats {
        VerifierStats {
            entries_digested: self.counters.entries_digested.load(Ordering::Relaxed),
            bytes_digested: self.counters.bytes_digested.load(Ordering::Relaxed),
            blocks_verified: self.counters.blocks_verified.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for JarVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JarVerifier")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
