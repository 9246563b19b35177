//! End-to-end verification of signed archives
//!
//! Archives are built in memory, signed with `JarSigner`, then tampered
//! with or reordered before being opened through `SignedArchive`:
//! - Signed entries verify; modified bytes yield unsigned verdicts
//! - Archives without usable signatures do no digesting
//! - Block and signature file order does not matter
//! - Multiple signers and code source partitioning
//! - Metadata edge cases (directories, embedded signature files, bad blocks)

use std::io::Read;
use std::sync::Arc;

use jarsig::archive::{EntryStatus, ExitCode};
use jarsig::block::{generate_signing_key, BlockSigner, Certificate, Ed25519BlockParser};
use jarsig::manifest::DigestAlgorithm;
use jarsig::{
    EntryVerdict, EntrySource, JarSigner, MemorySource, SignedArchive, VerifierConfig,
};

const MAIN_CLASS: &str = "com/example/Main.class";
const HELPER_CLASS: &str = "com/example/util/Helper.class";
const EMPTY_FILE: &str = "resources/empty.txt";
const SERVICE_FILE: &str = "META-INF/services/com.example.Plugin";

fn signer_with(subject: &str, alg: DigestAlgorithm) -> JarSigner {
    let key = generate_signing_key();
    let cert = Certificate::self_signed(subject, &key).expect("certificate");
    JarSigner::new(BlockSigner::new(key, vec![cert], alg).expect("block signer"))
}

fn signer(subject: &str) -> JarSigner {
    signer_with(subject, DigestAlgorithm::Sha256)
}

fn unsigned_source() -> MemorySource {
    let mut source = MemorySource::new();
    source
        .add_directory("META-INF/")
        .add_directory("META-INF/services/")
        .add_file(SERVICE_FILE, "com.example.PluginImpl\n")
        .add_directory("com/")
        .add_directory("com/example/")
        .add_file(MAIN_CLASS, vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x01, 0x02])
        .add_directory("com/example/util/")
        .add_file(HELPER_CLASS, "helper bytes".repeat(500))
        .add_file(EMPTY_FILE, Vec::new());
    source
}

fn sign(source: &MemorySource, signer: &JarSigner) -> MemorySource {
    signer
        .sign(source)
        .expect("signing should succeed")
        .apply(source)
        .expect("apply should succeed")
}

fn open_with(source: MemorySource, config: &VerifierConfig) -> SignedArchive<MemorySource> {
    SignedArchive::open(source, Arc::new(config.block_parser()), config)
        .expect("archive should open")
}

fn open(source: MemorySource) -> SignedArchive<MemorySource> {
    open_with(source, &VerifierConfig::default())
}

fn read_fully(archive: &SignedArchive<MemorySource>, name: &str) -> (Vec<u8>, EntryVerdict) {
    let mut reader = archive.read_entry(name).expect("entry should open");
    let mut data = Vec::new();
    reader.read_to_end(&mut data).expect("entry should read");
    (data, archive.verdict(name))
}

fn signer_count(verdict: &EntryVerdict) -> usize {
    verdict.signers().map_or(0, |s| s.len())
}

// =============================================================================
// Signed and tampered entries
// =============================================================================

#[test]
fn test_signed_archive_verifies() {
    let archive = open(sign(&unsigned_source(), &signer("CN=Alice")));
    assert!(archive.is_signed());

    for name in [MAIN_CLASS, HELPER_CLASS, SERVICE_FILE] {
        let (_, verdict) = read_fully(&archive, name);
        assert_eq!(signer_count(&verdict), 1, "{} should be signed", name);
    }

    let report = archive.verify_all();
    assert_eq!(report.summary.signed, 4);
    assert_eq!(report.summary.digest_mismatch, 0);
    assert_eq!(report.exit_code(), ExitCode::Success);
}

#[test]
fn test_read_returns_original_bytes() {
    let original = unsigned_source();
    let archive = open(sign(&original, &signer("CN=Alice")));
    let (data, _) = read_fully(&archive, HELPER_CLASS);
    assert_eq!(data, original.get(HELPER_CLASS).unwrap());
}

#[test]
fn test_flipped_byte_is_unsigned() {
    let mut signed = sign(&unsigned_source(), &signer("CN=Alice"));
    let mut tampered = signed.get(MAIN_CLASS).unwrap().to_vec();
    tampered[3] ^= 0x01;
    signed.corrupt(MAIN_CLASS, tampered);

    let archive = open(signed);
    let (_, verdict) = read_fully(&archive, MAIN_CLASS);
    assert_eq!(verdict, EntryVerdict::Unsigned);

    // Tampering one entry leaves the others intact.
    let (_, verdict) = read_fully(&archive, HELPER_CLASS);
    assert!(verdict.is_signed());

    let report = archive.verify_all();
    assert_eq!(
        report.entry(MAIN_CLASS).unwrap().status,
        EntryStatus::DigestMismatch
    );
    assert_eq!(report.exit_code(), ExitCode::DigestMismatch);
}

#[test]
fn test_entry_missing_from_manifest_is_unsigned() {
    let mut signed = sign(&unsigned_source(), &signer("CN=Alice"));
    signed.add_file("com/example/Injected.class", "evil");

    let archive = open(signed);
    let (_, verdict) = read_fully(&archive, "com/example/Injected.class");
    assert_eq!(verdict, EntryVerdict::Unsigned);
    assert_eq!(
        archive.verify_all().entry("com/example/Injected.class").unwrap().status,
        EntryStatus::Unsigned
    );
}

#[test]
fn test_zero_size_entry_gets_verdict() {
    let archive = open(sign(&unsigned_source(), &signer("CN=Alice")));
    let reader = archive.read_entry(EMPTY_FILE).unwrap();
    // Processed without a single read.
    assert!(reader.verdict().map_or(false, EntryVerdict::is_signed));
    assert!(archive.verdict(EMPTY_FILE).is_signed());
}

#[test]
fn test_partial_read_records_no_verdict() {
    let archive = open(sign(&unsigned_source(), &signer("CN=Alice")));
    let mut reader = archive.read_entry(HELPER_CLASS).unwrap();
    let mut buf = [0u8; 16];
    reader.read_exact(&mut buf).unwrap();
    drop(reader);

    let verifier = archive.verifier().unwrap();
    assert!(verifier.recorded_verdict(HELPER_CLASS).is_none());
    assert_eq!(archive.verdict(HELPER_CLASS), EntryVerdict::Unsigned);

    // A later complete read still verifies.
    let (_, verdict) = read_fully(&archive, HELPER_CLASS);
    assert!(verdict.is_signed());
}

#[test]
fn test_first_verdict_wins() {
    let archive = open(sign(&unsigned_source(), &signer("CN=Alice")));
    let (_, first) = read_fully(&archive, MAIN_CLASS);
    let digested = archive.verifier().unwrap().stats().entries_digested;

    let (_, second) = read_fully(&archive, MAIN_CLASS);
    assert_eq!(first, second);
    assert_eq!(archive.verifier().unwrap().stats().entries_digested, digested);
}

// =============================================================================
// Archives with nothing to verify
// =============================================================================

#[test]
fn test_unsigned_archive() {
    let archive = open(unsigned_source());
    assert!(!archive.is_signed());
    assert!(archive.verifier().is_none());

    let (data, verdict) = read_fully(&archive, MAIN_CLASS);
    assert_eq!(data.len(), 7);
    assert_eq!(verdict, EntryVerdict::Unsigned);
    assert_eq!(archive.verify_all().summary.unsigned, 4);
}

#[test]
fn test_signature_file_without_block_digests_nothing() {
    let mut signed = sign(&unsigned_source(), &signer("CN=Alice"));
    signed.remove("META-INF/SIGNER.EC");

    let archive = open(signed);
    let verifier = archive.verifier().unwrap();
    assert!(verifier.nothing_to_verify());

    for name in [MAIN_CLASS, HELPER_CLASS, EMPTY_FILE] {
        let (_, verdict) = read_fully(&archive, name);
        assert_eq!(verdict, EntryVerdict::Unsigned);
    }
    let stats = verifier.stats();
    assert_eq!(stats.entries_digested, 0);
    assert_eq!(stats.bytes_digested, 0);
}

#[test]
fn test_unparseable_manifest_means_unsigned() {
    let mut signed = sign(&unsigned_source(), &signer("CN=Alice"));
    signed.add_file("META-INF/MANIFEST.MF", "Manifest-Version 1.0 without colon\r\n");

    let archive = open(signed);
    assert!(!archive.is_signed());
    assert!(archive.manifest().is_none());

    let (data, verdict) = read_fully(&archive, MAIN_CLASS);
    assert_eq!(data.len(), 7);
    assert_eq!(verdict, EntryVerdict::Unsigned);
}

// =============================================================================
// Metadata ordering and edge cases
// =============================================================================

#[test]
fn test_block_before_signature_file() {
    let signed = sign(&unsigned_source(), &signer("CN=Alice"));

    let mut reordered = MemorySource::new();
    for name in ["META-INF/MANIFEST.MF", "META-INF/SIGNER.EC", "META-INF/SIGNER.SF"] {
        reordered.add_file(name, signed.get(name).unwrap().to_vec());
    }
    for entry in signed.entries().unwrap() {
        if entry.is_directory {
            reordered.add_directory(entry.name);
        } else if reordered.get(&entry.name).is_none() {
            reordered.add_file(entry.name.clone(), signed.get(&entry.name).unwrap().to_vec());
        }
    }
    assert_eq!(reordered.names()[1], "META-INF/SIGNER.EC");

    let natural = open(signed);
    let archive = open(reordered);
    for name in [MAIN_CLASS, HELPER_CLASS, SERVICE_FILE, EMPTY_FILE] {
        let (_, expected) = read_fully(&natural, name);
        let (_, verdict) = read_fully(&archive, name);
        assert!(expected.is_signed(), "{} should be signed", name);
        assert_eq!(verdict, expected, "{} differs by metadata order", name);
    }
    assert_eq!(
        archive.code_source_mapper().code_sources(),
        natural.code_source_mapper().code_sources()
    );
}

#[test]
fn test_meta_inf_directory_has_no_verdict() {
    let archive = open(sign(&unsigned_source(), &signer("CN=Alice")));
    archive.verify_all();

    let verdicts = archive.verifier().unwrap().verdicts();
    assert!(!verdicts.contains_key("META-INF/"));
    assert!(!verdicts.contains_key("META-INF/services/"));
    assert!(!verdicts.contains_key("com/"));
    assert!(verdicts.contains_key(MAIN_CLASS));
}

#[test]
fn test_embedded_signature_file() {
    let signer = signer("CN=Alice").internal_sf(true);
    let mut signed = sign(&unsigned_source(), &signer);
    signed.remove("META-INF/SIGNER.SF");

    let archive = open(signed);
    let (_, verdict) = read_fully(&archive, MAIN_CLASS);
    assert!(verdict.is_signed());
}

#[test]
fn test_garbage_block_degrades_to_unsigned() {
    let mut signed = sign(&unsigned_source(), &signer("CN=Alice"));
    signed.add_file("META-INF/SIGNER.EC", vec![0x30, 0x82, 0x05, 0x00, 0xFF]);

    let archive = open(signed);
    assert!(!archive.is_signed());
    let (_, verdict) = read_fully(&archive, MAIN_CLASS);
    assert_eq!(verdict, EntryVerdict::Unsigned);
}

#[test]
fn test_modified_signature_file_fails_block() {
    let mut signed = sign(&unsigned_source(), &signer("CN=Alice"));
    let mut sf = signed.get("META-INF/SIGNER.SF").unwrap().to_vec();
    sf.extend_from_slice(b"Name: com/example/Injected.class\r\nSHA-256-Digest: AAAA\r\n\r\n");
    signed.add_file("META-INF/SIGNER.SF", sf);

    let archive = open(signed);
    assert!(!archive.is_signed());
}

#[test]
fn test_tampered_manifest_section_drops_only_that_entry() {
    let mut signed = sign(&unsigned_source(), &signer("CN=Alice"));
    let manifest = String::from_utf8(signed.get("META-INF/MANIFEST.MF").unwrap().to_vec())
        .unwrap();
    // Re-point the Main.class section at different content.
    let forged_digest = base64_digest(b"replacement");
    let mut lines: Vec<String> = manifest.split("\r\n").map(str::to_string).collect();
    let name_line = lines
        .iter()
        .position(|l| l == &format!("Name: {}", MAIN_CLASS))
        .unwrap();
    lines[name_line + 1] = format!("SHA-256-Digest: {}", forged_digest);
    signed.add_file("META-INF/MANIFEST.MF", lines.join("\r\n"));
    signed.add_file(MAIN_CLASS, "replacement");

    let archive = open(signed);
    let (_, verdict) = read_fully(&archive, MAIN_CLASS);
    assert_eq!(verdict, EntryVerdict::Unsigned);
    let (_, verdict) = read_fully(&archive, HELPER_CLASS);
    assert!(verdict.is_signed());
}

fn base64_digest(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(DigestAlgorithm::Sha256.digest(data))
}

// =============================================================================
// Policy
// =============================================================================

#[test]
fn test_untrusted_root_is_unsigned() {
    let config = VerifierConfig {
        trusted_fingerprints: vec!["0".repeat(64)],
        ..VerifierConfig::default()
    };
    let archive = open_with(sign(&unsigned_source(), &signer("CN=Alice")), &config);
    assert!(!archive.is_signed());
}

#[test]
fn test_trusted_root_is_signed() {
    let key = generate_signing_key();
    let cert = Certificate::self_signed("CN=Alice", &key).unwrap();
    let config = VerifierConfig {
        trusted_fingerprints: vec![cert.fingerprint()],
        ..VerifierConfig::default()
    };
    let signer = JarSigner::new(
        BlockSigner::new(key, vec![cert], DigestAlgorithm::Sha256).unwrap(),
    );
    let archive = open_with(sign(&unsigned_source(), &signer), &config);
    assert!(archive.is_signed());
    assert!(read_fully(&archive, MAIN_CLASS).1.is_signed());
}

#[test]
fn test_disabled_algorithm_is_unsigned() {
    let signed = sign(&unsigned_source(), &signer_with("CN=Alice", DigestAlgorithm::Sha1));
    assert!(open(signed.clone()).is_signed());

    let config = VerifierConfig {
        disabled_algorithms: vec!["SHA-1".to_string()],
        ..VerifierConfig::default()
    };
    let archive = open_with(signed, &config);
    assert!(!archive.is_signed());
}

#[test]
fn test_plain_ed25519_parser() {
    let signed = sign(&unsigned_source(), &signer("CN=Alice"));
    let archive = SignedArchive::open(
        signed,
        Arc::new(Ed25519BlockParser::new()),
        &VerifierConfig::default(),
    )
    .unwrap();
    assert!(archive.is_signed());
}

// =============================================================================
// Multiple signers and code sources
// =============================================================================

#[test]
fn test_multiply_signed_entry() {
    let once = sign(&unsigned_source(), &signer("CN=Alice"));
    let bob = signer("CN=Bob").base_name("BOB").unwrap();
    let twice = sign(&once, &bob);

    let archive = open(twice);
    let (_, verdict) = read_fully(&archive, MAIN_CLASS);
    assert_eq!(signer_count(&verdict), 2);

    let subjects: Vec<String> = verdict
        .signers()
        .unwrap()
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert!(subjects.contains(&"CN=Alice".to_string()));
    assert!(subjects.contains(&"CN=Bob".to_string()));
}

#[test]
fn test_code_sources_partition_entries() {
    let mut once = sign(&unsigned_source(), &signer("CN=Alice"));
    once.add_file("com/example/Plugin.class", "plugin");
    let bob = signer("CN=Bob").base_name("BOB").unwrap();
    let mut twice = sign(&once, &bob);
    twice.add_file("README.txt", "not signed by anyone");

    let archive = open(twice);
    archive.verify_all();

    assert_eq!(signer_count(&archive.verdict(MAIN_CLASS)), 2);
    assert_eq!(signer_count(&archive.verdict("com/example/Plugin.class")), 1);
    assert_eq!(archive.verdict("README.txt"), EntryVerdict::Unsigned);

    let mapper = archive.code_source_mapper();
    let sources = mapper.code_sources();
    assert_eq!(sources.len(), 3);
    assert!(!sources.last().unwrap().is_signed());

    let groups = mapper.partition([MAIN_CLASS, HELPER_CLASS, "com/example/Plugin.class", "README.txt"]);
    assert_eq!(groups.len(), 3);
    let both = groups
        .iter()
        .find(|(cs, _)| cs.signers().map_or(0, |s| s.len()) == 2)
        .unwrap();
    assert_eq!(both.1, vec![MAIN_CLASS, HELPER_CLASS]);

    assert_eq!(archive.code_source(MAIN_CLASS), archive.code_source(HELPER_CLASS));
    assert_ne!(archive.code_source(MAIN_CLASS), archive.code_source("README.txt"));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_readers() {
    let archive = open(sign(&unsigned_source(), &signer("CN=Alice")));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for name in [MAIN_CLASS, HELPER_CLASS, SERVICE_FILE] {
                    let mut reader = archive.read_entry(name).unwrap();
                    std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
                }
            });
        }
    });

    for name in [MAIN_CLASS, HELPER_CLASS, SERVICE_FILE] {
        assert!(archive.verdict(name).is_signed());
    }
}

#[test]
fn test_entries_for_code_source() {
    let mut signed = sign(&unsigned_source(), &signer("CN=Alice"));
    signed.add_file("late.txt", "added after signing");
    let archive = open(signed);
    archive.verify_all();

    let signed_source = archive.code_source(MAIN_CLASS);
    assert!(signed_source.is_signed());
    let mut names = archive.entries_for(&signed_source);
    names.sort();
    assert_eq!(names, vec![SERVICE_FILE, MAIN_CLASS, HELPER_CLASS, EMPTY_FILE]);

    let unsigned = archive.code_source("late.txt");
    assert_eq!(archive.entries_for(&unsigned), vec!["late.txt"]);
}
