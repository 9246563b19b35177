//! jarsig - streaming signature verification for signed JAR archives
//!
//! Entries are verified while they are read: the manifest and signature
//! metadata are processed up front, then each ordinary entry's bytes are
//! digested on the fly and compared with the manifest once the entry has
//! been fully consumed. Tampering yields an unsigned verdict instead of a
//! read failure.
//!
//! The manifest model lives in `jarsig-manifest` and the signature block
//! capability in `jarsig-block`; both are re-exported here.

pub mod archive;
pub mod code_source;
pub mod config;
pub mod names;
pub mod signer;
pub mod stream;
pub mod verifier;

pub use jarsig_block as block;
pub use jarsig_manifest as manifest;

pub use archive::{
    ArchiveEntry, ArchiveError, DirectorySource, EntryReader, EntrySource, MemorySource,
    SignedArchive, VerificationReport,
};
pub use code_source::{CodeSource, CodeSourceMapper};
pub use config::{ConfigError, VerifierConfig};
pub use signer::{JarSigner, SignedOutput, SignerError};
pub use stream::VerifierStream;
pub use verifier::{EntryPhase, EntryVerdict, EntryVerifier, JarVerifier, SignerSet, VerifierStats};
