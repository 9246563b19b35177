//! Verifier configuration
//!
//! Settings are layered, later layers taking precedence:
//! 1. Builtin defaults
//! 2. A TOML config file (`--config`)
//! 3. CLI flags
//!
//! The merged value is validated and deserialized into [`VerifierConfig`].

mod merge;

use std::fs;
use std::path::Path;

use jarsig_block::Ed25519BlockParser;
use jarsig_manifest::{DigestAlgorithm, DEFAULT_MAX_LINE_LENGTH, LINE_WIDTH};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use merge::{merge_into, merge_layers, toml_to_json};

/// Upper bound accepted for `max_line_length`.
pub const MAX_LINE_LENGTH_LIMIT: usize = 64 * 1024;

/// Verification policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfig {
    /// Longest accepted manifest or signature file line, terminator included
    pub max_line_length: usize,

    /// Digest algorithms that must not be relied on, by JAR name
    pub disabled_algorithms: Vec<String>,

    /// Accepted root certificate fingerprints (hex). Empty trusts any
    /// well-formed self-signed root.
    pub trusted_fingerprints: Vec<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            disabled_algorithms: vec!["MD2".to_string(), "MD5".to_string()],
            trusted_fingerprints: Vec::new(),
        }
    }
}

/// Where a configuration layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

impl VerifierConfig {
    /// Merge the builtin defaults, an optional TOML file and optional CLI
    /// overrides.
    pub fn load(file: Option<&Path>, cli: Option<Value>) -> Result<Self, ConfigError> {
        let builtin = serde_json::to_value(Self::default())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut layers = vec![(ConfigOrigin::Builtin, builtin)];

        if let Some(path) = file {
            let text = fs::read_to_string(path)
                .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
            let doc: toml::Value = toml::from_str(&text)
                .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
            layers.push((ConfigOrigin::File, toml_to_json(doc)));
        }
        if let Some(overrides) = cli {
            layers.push((ConfigOrigin::Cli, overrides));
        }

        let origins: Vec<ConfigOrigin> = layers.iter().map(|(origin, _)| *origin).collect();
        debug!("merging config layers {:?}", origins);

        let merged = merge_layers(layers.into_iter().map(|(_, value)| value));
        let config: Self =
            serde_json::from_value(merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_line_length < LINE_WIDTH || self.max_line_length > MAX_LINE_LENGTH_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "max_line_length must be in [{}, {}]",
                LINE_WIDTH, MAX_LINE_LENGTH_LIMIT
            )));
        }
        if let Some(bad) = self
            .trusted_fingerprints
            .iter()
            .find(|fp| fp.len() != 64 || !fp.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(ConfigError::ValidationError(format!(
                "trusted fingerprint {:?} is not 64 hex digits",
                bad
            )));
        }
        Ok(())
    }

    /// Whether digests computed with `alg` may be relied on.
    pub fn permits(&self, alg: DigestAlgorithm) -> bool {
        !self
            .disabled_algorithms
            .iter()
            .any(|name| DigestAlgorithm::from_name(name) == Some(alg))
    }

    /// Block parser honouring the configured trust anchors.
    pub fn block_parser(&self) -> Ed25519BlockParser {
        Ed25519BlockParser::with_trust_anchors(self.trusted_fingerprints.clone())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_only() {
        let config = VerifierConfig::load(None, None).unwrap();
        assert_eq!(config, VerifierConfig::default());
        assert_eq!(config.max_line_length, 512);
        assert!(config.permits(DigestAlgorithm::Sha1));
        assert!(config.permits(DigestAlgorithm::Sha256));
    }

    #[test]
    fn test_file_then_cli() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "max_line_length = 1024").unwrap();
        writeln!(temp, "disabled_algorithms = [\"SHA-1\"]").unwrap();

        let cli = serde_json::json!({ "max_line_length": 2048 });
        let config = VerifierConfig::load(Some(temp.path()), Some(cli)).unwrap();

        assert_eq!(config.max_line_length, 2048);
        assert!(!config.permits(DigestAlgorithm::Sha1));
        assert!(config.permits(DigestAlgorithm::Sha512));
    }

    #[test]
    fn test_line_length_validation() {
        let cli = serde_json::json!({ "max_line_length": 10 });
        let err = VerifierConfig::load(None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("max_line_length"));
    }

    #[test]
    fn test_fingerprint_validation() {
        let cli = serde_json::json!({ "trusted_fingerprints": ["not-hex"] });
        let err = VerifierConfig::load(None, Some(cli)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "max_lines = 3").unwrap();
        let err = VerifierConfig::load(Some(temp.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = VerifierConfig::load(Some(Path::new("/nonexistent/jarsig.toml")), None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
