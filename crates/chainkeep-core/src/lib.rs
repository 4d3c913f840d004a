use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod forensics;
pub mod ledger;
pub mod registry;
pub mod report;
pub mod session;
pub mod store;
pub mod verify;

pub use cancel::CancelToken;
pub use catalog::{EvidenceCatalog, ScanFailure, ScanOutcome, ScanProgress};
pub use config::CustodyConfig;
pub use error::{CustodyError, Result};
pub use forensics::{hash_file, HashAlgorithm};
pub use ledger::{CustodyLedger, CustodyLogEntry};
pub use registry::{CaseRegistry, CaseSummary};
pub use report::CaseReport;
pub use session::CaseSession;
pub use store::CaseStore;
pub use verify::{Issue, IssueReason, VerificationOutcome, VerifyOptions, VerifyProgress};

/// Top-level container of a forensic investigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: String,
    pub primary_investigator: String,
    pub created_at: DateTime<Utc>,
    pub evidence_root: PathBuf,
    pub description: String,
}

impl Case {
    pub fn new(
        case_id: impl Into<String>,
        investigator: impl Into<String>,
        evidence_root: impl AsRef<Path>,
        description: Option<String>,
    ) -> Result<Self> {
        let case_id = case_id.into();
        validate_case_id(&case_id)?;
        let description = description
            .unwrap_or_else(|| format!("Digital forensic investigation for case {}", case_id));

        Ok(Self {
            case_id,
            primary_investigator: investigator.into(),
            created_at: Utc::now(),
            evidence_root: evidence_root.as_ref().to_path_buf(),
            description,
        })
    }
}

/// Case ids key snapshot file names, so they must be a single path component
pub fn validate_case_id(case_id: &str) -> Result<()> {
    let trimmed = case_id.trim();
    let invalid = trimmed.is_empty()
        || trimmed != case_id
        || case_id == "."
        || case_id == ".."
        || case_id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(CustodyError::InvalidCaseId(case_id.to_string()));
    }
    Ok(())
}

/// Integrity status of an evidence item
///
/// `Acquired` is only ever set at intake. Every verification pass
/// re-derives the status from the file on disk, so any of the other three
/// may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceStatus {
    Acquired,
    Verified,
    Missing,
    Modified,
}

impl std::fmt::Display for EvidenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceStatus::Acquired => write!(f, "acquired"),
            EvidenceStatus::Verified => write!(f, "verified"),
            EvidenceStatus::Missing => write!(f, "missing"),
            EvidenceStatus::Modified => write!(f, "modified"),
        }
    }
}

/// Digest bound to the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash {
    pub algorithm: HashAlgorithm,
    pub digest: String,
}

impl ContentHash {
    /// Case-insensitive digest comparison; algorithms must agree
    pub fn matches(&self, other: &ContentHash) -> bool {
        self.algorithm == other.algorithm && self.digest.eq_ignore_ascii_case(&other.digest)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

/// One cataloged file under investigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Sequential within the case, never reused
    pub id: u64,
    pub filename: String,
    /// Relative to the case's evidence root, or the path as given for manual intake
    pub relative_path: PathBuf,
    /// Used to re-read the file during verification
    pub absolute_path: PathBuf,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_modified: Option<DateTime<Utc>>,
    pub hash: ContentHash,
    pub acquired_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    pub status: EvidenceStatus,
}

impl EvidenceItem {
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}

/// Item counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub acquired: usize,
    pub verified: usize,
    pub missing: usize,
    pub modified: usize,
}

impl StatusCounts {
    pub fn tally<'a>(items: impl IntoIterator<Item = &'a EvidenceItem>) -> Self {
        let mut counts = Self::default();
        for item in items {
            counts.total += 1;
            match item.status {
                EvidenceStatus::Acquired => counts.acquired += 1,
                EvidenceStatus::Verified => counts.verified += 1,
                EvidenceStatus::Missing => counts.missing += 1,
                EvidenceStatus::Modified => counts.modified += 1,
            }
        }
        counts
    }
}

/// The persisted unit: case metadata, evidence catalog and custody ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    pub case_info: Case,
    pub catalog: EvidenceCatalog,
    pub ledger: CustodyLedger,
}

impl CaseRecord {
    pub fn new(case_info: Case) -> Self {
        Self {
            case_info,
            catalog: EvidenceCatalog::new(),
            ledger: CustodyLedger::new(),
        }
    }

    pub fn case_id(&self) -> &str {
        &self.case_info.case_id
    }

    pub fn status_counts(&self) -> StatusCounts {
        StatusCounts::tally(self.catalog.items())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_id_validation() {
        assert!(validate_case_id("CASE-2026-001").is_ok());
        assert!(validate_case_id("case 7").is_ok());

        for bad in ["", "  ", " CASE", "a/b", "a\\b", "..", "."] {
            assert!(
                matches!(validate_case_id(bad), Err(CustodyError::InvalidCaseId(_))),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_default_description() {
        let case = Case::new("CASE-9", "J. Rivera", "/evidence", None).unwrap();
        assert_eq!(case.description, "Digital forensic investigation for case CASE-9");

        let case = Case::new("CASE-9", "J. Rivera", "/evidence", Some("Laptop".into())).unwrap();
        assert_eq!(case.description, "Laptop");
    }

    #[test]
    fn test_content_hash_matching() {
        let a = ContentHash {
            algorithm: HashAlgorithm::MD5,
            digest: "ABCDEF".to_string(),
        };
        let b = ContentHash {
            algorithm: HashAlgorithm::MD5,
            digest: "abcdef".to_string(),
        };
        let c = ContentHash {
            algorithm: HashAlgorithm::SHA1,
            digest: "abcdef".to_string(),
        };
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert_eq!(b.to_string(), "md5:abcdef");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&EvidenceStatus::Modified).unwrap();
        assert_eq!(json, "\"modified\"");
    }
}
