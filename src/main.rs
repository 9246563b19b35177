//! jarsig CLI
//!
//! Entry point for the `jarsig` command-line tool. Archives are handled in
//! exploded form: a directory whose tree is the archive's entries.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jarsig::archive::ExitCode;
use jarsig::block::{
    decode_signing_key, encode_signing_key, generate_signing_key, key_fingerprint, BlockSigner,
    Certificate, SigningKey,
};
use jarsig::manifest::DigestAlgorithm;
use jarsig::{DirectorySource, JarSigner, SignedArchive, VerifierConfig};
use log::debug;

#[derive(Parser)]
#[command(name = "jarsig")]
#[command(about = "Verify and sign JAR archives", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify every entry of an exploded archive
    Verify {
        /// Archive root directory
        path: PathBuf,

        /// Path to a TOML config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Accept only certificate paths rooted at these fingerprints
        #[arg(long = "trust", value_delimiter = ',')]
        trust: Option<Vec<String>>,

        /// Override the maximum manifest line length
        #[arg(long)]
        max_line_length: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Sign an exploded archive in place
    Sign {
        /// Archive root directory
        path: PathBuf,

        /// Signing key file (base64)
        #[arg(long)]
        key: PathBuf,

        /// Certificate path file (JSON array, leaf first)
        #[arg(long)]
        cert: PathBuf,

        /// Signature file base name
        #[arg(long, default_value = "SIGNER")]
        name: String,

        /// Digest algorithm for manifest and signature file digests
        #[arg(long, default_value = "SHA-256")]
        digest: String,

        /// Embed the signature file in the signature block
        #[arg(long)]
        internal_sf: bool,

        /// Omit the whole-manifest digest from the signature file
        #[arg(long)]
        no_manifest_digest: bool,
    },

    /// Generate a signing key and certificate
    Keygen {
        /// Output directory
        #[arg(long)]
        out: PathBuf,

        /// Certificate subject
        #[arg(long, default_value = "CN=jarsig")]
        subject: String,

        /// Issue from this CA key instead of self-signing
        #[arg(long, requires = "ca_cert")]
        ca_key: Option<PathBuf>,

        /// Certificate path file of the CA
        #[arg(long, requires = "ca_key")]
        ca_cert: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            path,
            config,
            trust,
            max_line_length,
            json,
        } => {
            run_verify(&path, config, trust, max_line_length, json);
        }
        Commands::Sign {
            path,
            key,
            cert,
            name,
            digest,
            internal_sf,
            no_manifest_digest,
        } => {
            run_sign(&path, &key, &cert, &name, &digest, internal_sf, no_manifest_digest);
        }
        Commands::Keygen {
            out,
            subject,
            ca_key,
            ca_cert,
        } => {
            run_keygen(&out, &subject, ca_key.zip(ca_cert));
        }
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(ExitCode::Error.as_i32());
}

fn run_verify(
    path: &Path,
    config_path: Option<PathBuf>,
    trust: Option<Vec<String>>,
    max_line_length: Option<usize>,
    json_output: bool,
) {
    let mut overrides = serde_json::Map::new();
    if let Some(trust) = trust {
        overrides.insert("trusted_fingerprints".to_string(), serde_json::json!(trust));
    }
    if let Some(max) = max_line_length {
        overrides.insert("max_line_length".to_string(), serde_json::json!(max));
    }
    let cli = (!overrides.is_empty()).then(|| serde_json::Value::Object(overrides));

    let config = match VerifierConfig::load(config_path.as_deref(), cli) {
        Ok(c) => c,
        Err(e) => fail(format!("loading config: {}", e)),
    };
    debug!("effective config: {:?}", config);

    let source = DirectorySource::new(path);
    let archive = match SignedArchive::open(source, Arc::new(config.block_parser()), &config) {
        Ok(a) => a,
        Err(e) => fail(e),
    };
    let report = archive.verify_all();

    if json_output {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => fail(format!("serializing report: {}", e)),
        }
    } else {
        print!("{}", report.to_human());
    }
    process::exit(report.exit_code().as_i32());
}

fn load_certificates(path: &Path) -> Vec<Certificate> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => fail(format!("{}: {}", path.display(), e)),
    };
    match serde_json::from_str(&text) {
        Ok(certs) => certs,
        Err(e) => fail(format!("{}: {}", path.display(), e)),
    }
}

fn load_key(path: &Path) -> SigningKey {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => fail(format!("{}: {}", path.display(), e)),
    };
    match decode_signing_key(&text) {
        Ok(key) => key,
        Err(e) => fail(format!("{}: {}", path.display(), e)),
    }
}

fn run_sign(
    path: &Path,
    key_path: &Path,
    cert_path: &Path,
    name: &str,
    digest: &str,
    internal_sf: bool,
    no_manifest_digest: bool,
) {
    let Some(alg) = DigestAlgorithm::from_name(digest) else {
        fail(format!("unsupported digest algorithm {}", digest));
    };
    let key = load_key(key_path);
    let certificates = load_certificates(cert_path);

    let block_signer = match BlockSigner::new(key, certificates, alg) {
        Ok(s) => s,
        Err(e) => fail(e),
    };
    let signer = match JarSigner::new(block_signer).base_name(name) {
        Ok(s) => s
            .internal_sf(internal_sf)
            .sign_manifest(!no_manifest_digest),
        Err(e) => fail(e),
    };

    let source = DirectorySource::new(path);
    let output = match signer.sign(&source) {
        Ok(o) => o,
        Err(e) => fail(e),
    };
    if let Err(e) = output.write_to_dir(&source) {
        fail(e);
    }
    for (file, _) in output.files() {
        println!("wrote {}", file);
    }
}

fn run_keygen(out: &Path, subject: &str, ca: Option<(PathBuf, PathBuf)>) {
    if let Err(e) = fs::create_dir_all(out) {
        fail(format!("{}: {}", out.display(), e));
    }
    let key = generate_signing_key();

    let chain = match ca {
        None => match Certificate::self_signed(subject, &key) {
            Ok(cert) => vec![cert],
            Err(e) => fail(e),
        },
        Some((ca_key_path, ca_cert_path)) => {
            let ca_key = load_key(&ca_key_path);
            let ca_chain = load_certificates(&ca_cert_path);
            let Some(ca_cert) = ca_chain.first() else {
                fail(format!("{}: empty certificate path", ca_cert_path.display()));
            };
            match Certificate::issue(subject, &key.verifying_key(), ca_cert, &ca_key) {
                Ok(cert) => std::iter::once(cert).chain(ca_chain.iter().cloned()).collect(),
                Err(e) => fail(e),
            }
        }
    };

    let key_path = out.join("signer.key");
    let cert_path = out.join("signer.cert.json");
    let cert_json = match serde_json::to_string_pretty(&chain) {
        Ok(j) => j,
        Err(e) => fail(e),
    };
    if let Err(e) = fs::write(&key_path, encode_signing_key(&key)) {
        fail(format!("{}: {}", key_path.display(), e));
    }
    if let Err(e) = fs::write(&cert_path, cert_json) {
        fail(format!("{}: {}", cert_path.display(), e));
    }

    println!("key:         {}", key_path.display());
    println!("certificate: {}", cert_path.display());
    println!("key fingerprint:  {}", key_fingerprint(&key.verifying_key()));
    if let Some(root) = chain.last() {
        println!("root fingerprint: {}", root.fingerprint());
    }
}
