//! Signing exploded archives on disk and verifying them back
//!
//! Covers the flow the `jarsig sign` / `jarsig verify` commands use:
//! - Signing a directory tree in place
//! - Certificate chains and trust anchors
//! - Report output after tampering on disk

use std::fs;
use std::path::Path;
use std::sync::Arc;

use jarsig::archive::{EntryStatus, ExitCode};
use jarsig::block::{generate_signing_key, BlockSigner, Certificate};
use jarsig::manifest::{DigestAlgorithm, Manifest};
use jarsig::{DirectorySource, JarSigner, SignedArchive, VerifierConfig};
use tempfile::TempDir;

fn populate(root: &Path) {
    let source = DirectorySource::new(root);
    source
        .write_entry("com/example/App.class", b"\xCA\xFE\xBA\xBEapp")
        .unwrap();
    source
        .write_entry("com/example/res/strings.properties", b"greeting=hello\n")
        .unwrap();
    source
        .write_entry(
            "com/example/res/a-rather-long-resource-name-that-forces-manifest-line-folding.txt",
            b"folded",
        )
        .unwrap();
}

fn self_signed(subject: &str) -> JarSigner {
    let key = generate_signing_key();
    let cert = Certificate::self_signed(subject, &key).unwrap();
    JarSigner::new(BlockSigner::new(key, vec![cert], DigestAlgorithm::Sha256).unwrap())
}

fn sign_in_place(root: &Path, signer: &JarSigner) {
    let source = DirectorySource::new(root);
    let output = signer.sign(&source).expect("signing should succeed");
    output.write_to_dir(&source).expect("write should succeed");
}

fn verify(root: &Path, config: &VerifierConfig) -> jarsig::VerificationReport {
    let archive = SignedArchive::open(
        DirectorySource::new(root),
        Arc::new(config.block_parser()),
        config,
    )
    .expect("archive should open");
    archive.verify_all()
}

// =============================================================================
// Directory round trip
// =============================================================================

#[test]
fn test_sign_and_verify_directory() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    sign_in_place(dir.path(), &self_signed("CN=Builder"));

    assert!(dir.path().join("META-INF/MANIFEST.MF").exists());
    assert!(dir.path().join("META-INF/SIGNER.SF").exists());
    assert!(dir.path().join("META-INF/SIGNER.EC").exists());

    let report = verify(dir.path(), &VerifierConfig::default());
    assert!(report.signed_archive);
    assert_eq!(report.summary.signed, 3);
    assert_eq!(report.exit_code(), ExitCode::Success);

    let Some(EntryStatus::Signed { signers }) = report
        .entry("com/example/App.class")
        .map(|e| e.status.clone())
    else {
        panic!("App.class should be signed");
    };
    assert_eq!(signers[0].subject, "CN=Builder");
    assert!(signers[0].chain.is_empty());
}

#[test]
fn test_manifest_lines_are_folded() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    sign_in_place(dir.path(), &self_signed("CN=Builder"));

    let raw = fs::read(dir.path().join("META-INF/MANIFEST.MF")).unwrap();
    for line in raw.split(|b| *b == b'\n') {
        assert!(line.len() <= 72, "line longer than 72 bytes");
    }
    let manifest = Manifest::parse(&raw).unwrap();
    assert!(manifest
        .attributes(
            "com/example/res/a-rather-long-resource-name-that-forces-manifest-line-folding.txt"
        )
        .is_some());
}

#[test]
fn test_tampering_on_disk_is_reported() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    sign_in_place(dir.path(), &self_signed("CN=Builder"));

    fs::write(
        dir.path().join("com/example/res/strings.properties"),
        b"greeting=pwned\n",
    )
    .unwrap();
    fs::write(dir.path().join("com/example/Extra.class"), b"extra").unwrap();

    let report = verify(dir.path(), &VerifierConfig::default());
    assert_eq!(
        report.entry("com/example/res/strings.properties").unwrap().status,
        EntryStatus::DigestMismatch
    );
    assert_eq!(
        report.entry("com/example/Extra.class").unwrap().status,
        EntryStatus::Unsigned
    );
    assert_eq!(report.summary.signed, 2);
    assert_eq!(report.exit_code(), ExitCode::DigestMismatch);
}

#[test]
fn test_resigning_adds_second_signer() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    sign_in_place(dir.path(), &self_signed("CN=Builder"));
    let manifest_before = fs::read(dir.path().join("META-INF/MANIFEST.MF")).unwrap();

    let release = self_signed("CN=Release").base_name("release").unwrap();
    sign_in_place(dir.path(), &release);
    let manifest_after = fs::read(dir.path().join("META-INF/MANIFEST.MF")).unwrap();
    assert_eq!(manifest_before, manifest_after);

    let report = verify(dir.path(), &VerifierConfig::default());
    let Some(EntryStatus::Signed { signers }) = report
        .entry("com/example/App.class")
        .map(|e| e.status.clone())
    else {
        panic!("App.class should be signed");
    };
    assert_eq!(signers.len(), 2);
}

// =============================================================================
// Certificate chains and trust
// =============================================================================

#[test]
fn test_issued_certificate_chain() {
    let ca_key = generate_signing_key();
    let ca = Certificate::self_signed("CN=Example CA", &ca_key).unwrap();
    let leaf_key = generate_signing_key();
    let leaf = Certificate::issue("CN=Builder", &leaf_key.verifying_key(), &ca, &ca_key).unwrap();
    let signer = JarSigner::new(
        BlockSigner::new(leaf_key, vec![leaf, ca.clone()], DigestAlgorithm::Sha384).unwrap(),
    );

    let dir = TempDir::new().unwrap();
    populate(dir.path());
    sign_in_place(dir.path(), &signer);

    let pinned = VerifierConfig {
        trusted_fingerprints: vec![ca.fingerprint()],
        ..VerifierConfig::default()
    };
    let report = verify(dir.path(), &pinned);
    assert_eq!(report.summary.signed, 3);
    let Some(EntryStatus::Signed { signers }) = report
        .entry("com/example/App.class")
        .map(|e| e.status.clone())
    else {
        panic!("App.class should be signed");
    };
    assert_eq!(signers[0].chain, vec!["CN=Example CA".to_string()]);

    let other = VerifierConfig {
        trusted_fingerprints: vec!["ab".repeat(32)],
        ..VerifierConfig::default()
    };
    let report = verify(dir.path(), &other);
    assert!(!report.signed_archive);
    assert_eq!(report.summary.unsigned, 3);
}

#[test]
fn test_config_file_disables_algorithm() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    sign_in_place(dir.path(), &self_signed("CN=Builder"));

    let config_dir = TempDir::new().unwrap();
    let config_path = config_dir.path().join("jarsig.toml");
    fs::write(&config_path, "disabled_algorithms = [\"SHA-256\"]\n").unwrap();
    let config = VerifierConfig::load(Some(&config_path), None).unwrap();

    let report = verify(dir.path(), &config);
    assert!(!report.signed_archive);
    assert_eq!(report.summary.signed, 0);
}

// =============================================================================
// Report output
// =============================================================================

#[test]
fn test_report_json() {
    let dir = TempDir::new().unwrap();
    populate(dir.path());
    sign_in_place(dir.path(), &self_signed("CN=Builder"));

    let report = verify(dir.path(), &VerifierConfig::default());
    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(value["signed_archive"], true);
    assert_eq!(value["summary"]["signed"], 3);
    let app = value["entries"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["name"] == "com/example/App.class")
        .unwrap();
    assert_eq!(app["status"], "signed");
    assert_eq!(app["signers"][0]["subject"], "CN=Builder");

    let human = report.to_human();
    assert!(human.contains("signed    com/example/App.class  [CN=Builder]"));
    assert!(human.contains("3 signed, 0 unsigned, 0 mismatched, 0 unreadable"));
}
