//! Naming rules for archive metadata.
//!
//! Everything under `META-INF/` is metadata. Of that, the manifest, signature
//! files (`*.SF`), signature blocks (`*.RSA`, `*.DSA`, `*.EC`) and
//! `SIG-*` files are signature related and never covered by a signature
//! themselves. Comparisons are ASCII case-insensitive.

/// Metadata directory prefix
pub const META_INF: &str = "META-INF/";

/// Location of the manifest
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

/// Signature file extension
pub const SIGNATURE_FILE_EXTENSION: &str = "SF";

/// Recognised signature block extensions
pub const BLOCK_EXTENSIONS: [&str; 3] = ["RSA", "DSA", "EC"];

/// Kind of a signature entry directly under `META-INF/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEntryKind {
    /// `<BASE>.SF`
    SignatureFile,
    /// `<BASE>.RSA`, `<BASE>.DSA` or `<BASE>.EC`
    Block,
}

fn starts_with_ignore_case(name: &str, prefix: &str) -> bool {
    name.len() >= prefix.len()
        && name.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Strip one leading `/`, as some archivers write absolute entry names.
fn trim_root(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// Whether `name` lies under `META-INF/` (or is that directory).
pub fn is_meta(name: &str) -> bool {
    starts_with_ignore_case(trim_root(name), META_INF)
}

pub fn is_manifest(name: &str) -> bool {
    trim_root(name).eq_ignore_ascii_case(MANIFEST_NAME)
}

/// Classify a direct child of `META-INF/` as a signature file or block.
pub fn signature_entry_kind(name: &str) -> Option<SignatureEntryKind> {
    let name = trim_root(name);
    if !starts_with_ignore_case(name, META_INF) {
        return None;
    }
    let file = &name[META_INF.len()..];
    if file.contains('/') {
        return None;
    }
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    if ext.eq_ignore_ascii_case(SIGNATURE_FILE_EXTENSION) {
        Some(SignatureEntryKind::SignatureFile)
    } else if BLOCK_EXTENSIONS.iter().any(|b| ext.eq_ignore_ascii_case(b)) {
        Some(SignatureEntryKind::Block)
    } else {
        None
    }
}

/// Key pairing a block with its `.SF`: the upper-cased name without its
/// extension, e.g. `META-INF/SIGNER`.
pub fn signature_base_name(name: &str) -> String {
    let name = trim_root(name);
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    stem.to_ascii_uppercase()
}

/// Entries excluded from signing: the manifest, signature files, blocks,
/// `SIG-*` files and the `META-INF/` directory itself.
pub fn is_signature_related(name: &str) -> bool {
    let trimmed = trim_root(name);
    if is_manifest(trimmed) || signature_entry_kind(trimmed).is_some() {
        return true;
    }
    if trimmed.eq_ignore_ascii_case(META_INF) || trimmed.eq_ignore_ascii_case("META-INF") {
        return true;
    }
    starts_with_ignore_case(trimmed, "META-INF/SIG-") && !trimmed[META_INF.len()..].contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_prefix() {
        assert!(is_meta("META-INF/"));
        assert!(is_meta("meta-inf/services/x"));
        assert!(is_meta("/META-INF/MANIFEST.MF"));
        assert!(!is_meta("META-INFO/x"));
        assert!(!is_meta("com/META-INF/x"));
    }

    #[test]
    fn test_signature_entry_kind() {
        use SignatureEntryKind::*;
        assert_eq!(signature_entry_kind("META-INF/SIGNER.SF"), Some(SignatureFile));
        assert_eq!(signature_entry_kind("META-INF/signer.sf"), Some(SignatureFile));
        assert_eq!(signature_entry_kind("META-INF/SIGNER.RSA"), Some(Block));
        assert_eq!(signature_entry_kind("META-INF/SIGNER.DSA"), Some(Block));
        assert_eq!(signature_entry_kind("META-INF/SIGNER.EC"), Some(Block));
        assert_eq!(signature_entry_kind("META-INF/MANIFEST.MF"), None);
        assert_eq!(signature_entry_kind("META-INF/sub/SIGNER.SF"), None);
        assert_eq!(signature_entry_kind("META-INF/.SF"), None);
        assert_eq!(signature_entry_kind("lib/SIGNER.SF"), None);
    }

    #[test]
    fn test_base_name_pairs_sf_and_block() {
        assert_eq!(signature_base_name("META-INF/Signer.SF"), "META-INF/SIGNER");
        assert_eq!(
            signature_base_name("META-INF/signer.ec"),
            signature_base_name("META-INF/SIGNER.SF")
        );
    }

    #[test]
    fn test_signature_related() {
        assert!(is_signature_related("META-INF/MANIFEST.MF"));
        assert!(is_signature_related("META-INF/A.SF"));
        assert!(is_signature_related("META-INF/A.RSA"));
        assert!(is_signature_related("META-INF/SIG-A.txt"));
        assert!(is_signature_related("META-INF/"));
        assert!(!is_signature_related("META-INF/services/com.example.Plugin"));
        assert!(!is_signature_related("com/example/Main.class"));
    }
}
