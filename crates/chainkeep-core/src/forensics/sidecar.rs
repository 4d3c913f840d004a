/// Acquisition sidecar files
///
/// Acquisition tooling drops small records next to each artifact:
/// `disk.dd.md5` (one `"<digest>  <filename>"` line per algorithm file),
/// `disk.dd.metadata.json` and optionally `disk.dd.log`. This module reads
/// and writes them and cross-checks them against the artifact on disk.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::hash::{hash_file, HashAlgorithm};
use crate::error::{CustodyError, Result};
use crate::ContentHash;

pub const METADATA_SUFFIX: &str = ".metadata.json";
pub const CUSTODY_SUFFIX: &str = ".custody.json";
pub const LOG_SUFFIX: &str = ".log";
/// Appended to a snapshot path while it is being written
pub const TMP_SUFFIX: &str = ".tmp";

/// Extensions of files acquisition tooling produces, compared ignoring case
pub const ARTIFACT_EXTENSIONS: [&str; 7] = ["dd", "raw", "e01", "pcap", "pcapng", "mem", "dmp"];

const REQUIRED_METADATA_FIELDS: [&str; 3] = ["timestamp", "file_size", "acquisition_tool"];

/// Suffixes only ever written by this system or acquisition tooling.
/// Files carrying them are never cataloged as evidence.
pub fn sidecar_suffixes() -> Vec<String> {
    vec![
        METADATA_SUFFIX.to_string(),
        CUSTODY_SUFFIX.to_string(),
        format!("{}{}", CUSTODY_SUFFIX, TMP_SUFFIX),
    ]
}

/// Suffixes that mark a sidecar only when the artifact they describe exists.
/// A lone `auth.log` or `notes.md5` is evidence in its own right.
fn companion_suffixes() -> Vec<String> {
    let mut suffixes: Vec<String> = HashAlgorithm::all()
        .iter()
        .map(|a| format!(".{}", a.extension()))
        .collect();
    suffixes.push(LOG_SUFFIX.to_string());
    suffixes
}

/// Whether `path` is a sidecar of some artifact rather than evidence.
///
/// `X.metadata.json`, `X.custody.json` and `X.custody.json.tmp` always are.
/// `X.log` and `X.<algo>` are only when a regular file `X` sits beside them.
pub fn is_sidecar(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    if sidecar_suffixes().iter().any(|suffix| name.ends_with(suffix.as_str())) {
        return true;
    }
    companion_suffixes().iter().any(|suffix| match name.strip_suffix(suffix.as_str()) {
        Some(stem) if !stem.is_empty() => path.with_file_name(stem).is_file(),
        _ => false,
    })
}

/// `<artifact><suffix>`, keeping the artifact's full file name
pub fn sidecar_path(artifact: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = artifact.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn hash_sidecar_path(artifact: &Path, algorithm: HashAlgorithm) -> PathBuf {
    sidecar_path(artifact, &format!(".{}", algorithm.extension()))
}

/// Parsed hash sidecar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSidecar {
    pub algorithm: HashAlgorithm,
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Write `<artifact>.<algo>` for a computed hash
pub fn write_hash_sidecar(artifact: &Path, hash: &ContentHash) -> Result<PathBuf> {
    let filename = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let path = hash_sidecar_path(artifact, hash.algorithm);
    fs::write(&path, format!("{}  {}\n", hash.digest, filename))
        .map_err(|e| CustodyError::io(&path, e))?;
    Ok(path)
}

/// Read `<artifact>.<algo>`; `None` when no such sidecar exists
pub fn read_hash_sidecar(artifact: &Path, algorithm: HashAlgorithm) -> Result<Option<HashSidecar>> {
    let path = hash_sidecar_path(artifact, algorithm);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CustodyError::io(&path, e)),
    };

    let mut tokens = content.split_whitespace();
    let digest = tokens.next().ok_or_else(|| CustodyError::Corrupt {
        path: path.clone(),
        reason: "empty hash sidecar".to_string(),
    })?;
    let rest: Vec<&str> = tokens.collect();

    Ok(Some(HashSidecar {
        algorithm,
        digest: digest.to_ascii_lowercase(),
        filename: if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        },
    }))
}

/// First hash sidecar present, trying algorithms in [`HashAlgorithm::all`] order
pub fn find_hash_sidecar(artifact: &Path) -> Result<Option<HashSidecar>> {
    for algorithm in HashAlgorithm::all() {
        if let Some(sidecar) = read_hash_sidecar(artifact, algorithm)? {
            return Ok(Some(sidecar));
        }
    }
    Ok(None)
}

/// Metadata record written by acquisition tooling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionMetadata {
    pub timestamp: String,
    pub file_size: u64,
    pub acquisition_tool: String,

    /// Tool-specific fields, preserved as-is
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AcquisitionMetadata {
    /// Record stamped with the current time
    pub fn new(file_size: u64, acquisition_tool: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            file_size,
            acquisition_tool: acquisition_tool.into(),
            extra: serde_json::Map::new(),
        }
    }
}

pub fn write_metadata_sidecar(artifact: &Path, metadata: &AcquisitionMetadata) -> Result<PathBuf> {
    let path = sidecar_path(artifact, METADATA_SUFFIX);
    let json = serde_json::to_string_pretty(metadata).map_err(|e| CustodyError::Corrupt {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    fs::write(&path, json).map_err(|e| CustodyError::io(&path, e))?;
    Ok(path)
}

/// Outcome of one sidecar check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Passed,
    Failed(String),
    Skipped(String),
}

impl CheckStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// All sidecar checks for one artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarReport {
    pub file: PathBuf,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<HashAlgorithm>,
    pub hash: CheckStatus,
    pub metadata: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_record: Option<AcquisitionMetadata>,
    /// Metadata size against the cataloged size, when the artifact is cataloged
    pub catalog: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition_log: Option<PathBuf>,
}

impl SidecarReport {
    pub fn passed(&self) -> bool {
        !(self.hash.is_failed() || self.metadata.is_failed() || self.catalog.is_failed())
    }

    /// Compare the metadata sidecar's recorded size with the catalog's
    pub fn cross_check_catalog(&mut self, cataloged_size: u64) {
        self.catalog = match &self.metadata_record {
            Some(record) if record.file_size == cataloged_size => CheckStatus::Passed,
            Some(record) => CheckStatus::Failed(format!(
                "metadata size {} differs from cataloged size {}",
                record.file_size, cataloged_size
            )),
            None => CheckStatus::Skipped("no metadata record".to_string()),
        };
    }
}

/// Run hash, metadata and log checks for `artifact`.
///
/// With an explicit `algorithm` a missing sidecar fails the hash check;
/// otherwise the first sidecar found is used and absence is a skip.
pub fn check_sidecars(artifact: &Path, algorithm: Option<HashAlgorithm>) -> Result<SidecarReport> {
    let file_size = match fs::metadata(artifact) {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) | Err(_) => {
            return Err(CustodyError::FileNotFound {
                path: artifact.to_path_buf(),
            })
        }
    };

    let sidecar = match algorithm {
        Some(algorithm) => read_hash_sidecar(artifact, algorithm)?,
        None => find_hash_sidecar(artifact)?,
    };

    let (hash_algorithm, hash) = match (sidecar, algorithm) {
        (Some(sidecar), _) => {
            let actual = hash_file(artifact, sidecar.algorithm)?;
            let status = if actual.digest.eq_ignore_ascii_case(&sidecar.digest) {
                CheckStatus::Passed
            } else {
                CheckStatus::Failed(format!(
                    "hash mismatch: expected {}, got {}",
                    sidecar.digest, actual.digest
                ))
            };
            (Some(sidecar.algorithm), status)
        }
        (None, Some(algorithm)) => (
            Some(algorithm),
            CheckStatus::Failed(format!(
                "hash sidecar {} not found",
                hash_sidecar_path(artifact, algorithm).display()
            )),
        ),
        (None, None) => (None, CheckStatus::Skipped("no hash sidecar found".to_string())),
    };

    let (metadata, metadata_record) = check_metadata(artifact, file_size);

    let log_path = sidecar_path(artifact, LOG_SUFFIX);
    let acquisition_log = log_path.is_file().then_some(log_path);

    let report = SidecarReport {
        file: artifact.to_path_buf(),
        file_size,
        hash_algorithm,
        hash,
        metadata,
        metadata_record,
        catalog: CheckStatus::Skipped("not cataloged".to_string()),
        acquisition_log,
    };

    if report.passed() {
        tracing::info!("Sidecar checks passed for {}", artifact.display());
    } else {
        tracing::warn!("Sidecar checks failed for {}", artifact.display());
    }

    Ok(report)
}

/// Whether `path` names an acquisition artifact by its extension
pub fn is_artifact(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            ARTIFACT_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// An artifact found under a directory whose checks could not run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactError {
    pub file: PathBuf,
    pub error: String,
}

/// Sidecar checks for every acquisition artifact under one directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryCheck {
    pub root: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub total_files: usize,
    pub passed: usize,
    pub failed: usize,
    /// In path order
    pub results: Vec<SidecarReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ArtifactError>,
}

impl DirectoryCheck {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &SidecarReport> {
        self.results.iter().filter(|report| !report.passed())
    }
}

/// Run [`check_sidecars`] on every artifact below `root`, recursively.
///
/// Artifacts are recognized by [`ARTIFACT_EXTENSIONS`]; hidden files are
/// skipped. An artifact that cannot be checked counts as failed and is
/// listed in [`DirectoryCheck::errors`]. A directory without artifacts
/// passes with nothing checked.
pub fn check_sidecars_in_dir(
    root: &Path,
    algorithm: Option<HashAlgorithm>,
) -> Result<DirectoryCheck> {
    if !root.is_dir() {
        return Err(CustodyError::FileNotFound {
            path: root.to_path_buf(),
        });
    }

    tracing::info!("Checking acquisition sidecars under {}", root.display());

    let mut check = DirectoryCheck {
        root: root.to_path_buf(),
        timestamp: Utc::now(),
        total_files: 0,
        passed: 0,
        failed: 0,
        results: Vec::new(),
        errors: Vec::new(),
    };

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let file = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                tracing::warn!("Could not read {}: {}", file.display(), e);
                check.failed += 1;
                check.errors.push(ArtifactError {
                    file,
                    error: e.to_string(),
                });
                continue;
            }
        };
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !entry.file_type().is_file() || hidden || !is_artifact(entry.path()) {
            continue;
        }

        check.total_files += 1;
        match check_sidecars(entry.path(), algorithm) {
            Ok(report) => {
                if report.passed() {
                    check.passed += 1;
                } else {
                    check.failed += 1;
                }
                check.results.push(report);
            }
            Err(e) => {
                tracing::warn!("Could not check {}: {}", entry.path().display(), e);
                check.failed += 1;
                check.errors.push(ArtifactError {
                    file: entry.path().to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
    }

    if check.total_files == 0 {
        tracing::warn!("No acquisition artifacts found under {}", root.display());
    } else {
        tracing::info!(
            "Checked {} artifacts: {} passed, {} failed",
            check.total_files,
            check.passed,
            check.failed
        );
    }

    Ok(check)
}

fn check_metadata(artifact: &Path, actual_size: u64) -> (CheckStatus, Option<AcquisitionMetadata>) {
    let path = sidecar_path(artifact, METADATA_SUFFIX);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return (CheckStatus::Skipped("metadata sidecar not found".to_string()), None)
        }
        Err(e) => return (CheckStatus::Failed(format!("error reading metadata: {}", e)), None),
    };

    let value: serde_json::Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => return (CheckStatus::Failed(format!("invalid metadata JSON: {}", e)), None),
    };

    let missing: Vec<&str> = REQUIRED_METADATA_FIELDS
        .iter()
        .copied()
        .filter(|field| value.get(field).is_none())
        .collect();
    if !missing.is_empty() {
        return (
            CheckStatus::Failed(format!("missing metadata fields: {:?}", missing)),
            None,
        );
    }

    let record: AcquisitionMetadata = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(e) => return (CheckStatus::Failed(format!("malformed metadata: {}", e)), None),
    };

    let status = if record.file_size == actual_size {
        CheckStatus::Passed
    } else {
        CheckStatus::Failed(format!(
            "file size mismatch: expected {}, got {}",
            record.file_size, actual_size
        ))
    };
    (status, Some(record))
}
