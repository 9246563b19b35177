//! Verification report for a whole archive.

use chrono::{DateTime, Utc};
use jarsig_block::SignerRecord;
use serde::{Deserialize, Serialize};

/// Report schema version
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Stable exit codes for `jarsig verify`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Every entry verified, or the archive is unsigned
    Success = 0,
    /// At least one signed entry failed its digest check
    DigestMismatch = 1,
    /// Some entry could not be read
    ReadError = 2,
    /// Usage, configuration or I/O failure before verification
    Error = 3,
}

impl ExitCode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

/// Identity of one signer in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSummary {
    pub subject: String,

    /// Issuer subjects from the leaf's issuer up to the root
    pub chain: Vec<String>,

    /// Leaf certificate fingerprint
    pub fingerprint: String,
}

impl From<&SignerRecord> for SignerSummary {
    fn from(record: &SignerRecord) -> Self {
        let path = record.certificate_path();
        Self {
            subject: record.to_string(),
            chain: path.iter().skip(1).map(|c| c.subject.clone()).collect(),
            fingerprint: record.fingerprint(),
        }
    }
}

/// Outcome for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    Signed { signers: Vec<SignerSummary> },
    Unsigned,
    /// Covered by a signer but the bytes do not match the manifest
    DigestMismatch,
    ReadError { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryReport {
    pub name: String,
    #[serde(flatten)]
    pub status: EntryStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub signed: usize,
    pub unsigned: usize,
    pub digest_mismatch: usize,
    pub read_errors: usize,
}

/// Result of [`SignedArchive::verify_all`](super::SignedArchive::verify_all).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub schema_version: u32,

    /// Archive location
    pub location: String,

    pub created_at: DateTime<Utc>,

    /// Whether any signer covers any entry
    pub signed_archive: bool,

    pub entries: Vec<EntryReport>,

    pub summary: ReportSummary,
}

impl VerificationReport {
    pub fn new(location: String, signed_archive: bool) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            location,
            created_at: Utc::now(),
            signed_archive,
            entries: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    pub fn push(&mut self, entry: EntryReport) {
        match &entry.status {
            EntryStatus::Signed { .. } => self.summary.signed += 1,
            EntryStatus::Unsigned => self.summary.unsigned += 1,
            EntryStatus::DigestMismatch => self.summary.digest_mismatch += 1,
            EntryStatus::ReadError { .. } => self.summary.read_errors += 1,
        }
        self.entries.push(entry);
    }

    pub fn entry(&self, name: &str) -> Option<&EntryReport> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.summary.digest_mismatch > 0 {
            ExitCode::DigestMismatch
        } else if self.summary.read_errors > 0 {
            ExitCode::ReadError
        } else {
            ExitCode::Success
        }
    }

    /// Human readable summary, one line per entry.
    pub fn to_human(&self) -> String {
        let mut out = format!(
            "{} ({})\n",
            self.location,
            if self.signed_archive { "signed" } else { "unsigned" }
        );
        for entry in &self.entries {
            let line = match &entry.status {
                EntryStatus::Signed { signers } => {
                    let names: Vec<&str> = signers.iter().map(|s| s.subject.as_str()).collect();
                    format!("  signed    {}  [{}]", entry.name, names.join(", "))
                }
                EntryStatus::Unsigned => format!("  unsigned  {}", entry.name),
                EntryStatus::DigestMismatch => format!("  MISMATCH  {}", entry.name),
                EntryStatus::ReadError { message } => {
                    format!("  ERROR     {}: {}", entry.name, message)
                }
            };
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str(&format!(
            "{} signed, {} unsigned, {} mismatched, {} unreadable\n",
            self.summary.signed,
            self.summary.unsigned,
            self.summary.digest_mismatch,
            self.summary.read_errors
        ));
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
