//! JAR manifest model and section digester.
//!
//! - [`Manifest`]: streaming parse of `META-INF/MANIFEST.MF` style files
//!   and byte-stable serialization with 72-byte line folding.
//! - [`ManifestDigester`]: cached digests over the raw byte ranges of the
//!   main section and each entry section, as referenced by `.SF` files.
//! - [`DigestAlgorithm`]: the digest algorithms named in `<ALG>-Digest`
//!   attributes.

pub mod algorithm;
pub mod attributes;
pub mod digester;
pub mod error;
mod lines;
pub mod manifest;

pub use algorithm::{classify_digest_key, DigestAlgorithm, DigestContext, DigestKey};
pub use attributes::{validate_value, AttributeName, Attributes};
pub use digester::{ManifestDigester, MAIN_ATTRIBUTES};
pub use error::{ManifestError, ManifestResult};
pub use manifest::{declared_digests, Manifest, DEFAULT_MAX_LINE_LENGTH, LINE_WIDTH};
