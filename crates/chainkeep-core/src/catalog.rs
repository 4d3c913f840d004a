//! Evidence catalog: intake, hashing and id assignment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CustodyConfig;
use crate::error::{CustodyError, Result};
use crate::forensics::{hash_file_with, is_sidecar, HashOptions};
use crate::{EvidenceItem, EvidenceStatus};

/// Authoritative list of evidence items for one case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceCatalog {
    next_id: u64,
    items: Vec<EvidenceItem>,
}

/// A file the scan could not catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of a directory scan: what was cataloged and what was skipped
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub items: Vec<EvidenceItem>,
    pub failures: Vec<ScanFailure>,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanProgress {
    pub files_cataloged: usize,
    pub bytes_hashed: u64,
}

impl Default for EvidenceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceCatalog {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            items: Vec::new(),
        }
    }

    /// Rebuild from persisted parts; the store validates them first
    pub(crate) fn from_parts(next_id: u64, items: Vec<EvidenceItem>) -> Self {
        Self { next_id, items }
    }

    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn get(&self, id: u64) -> Option<&EvidenceItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Id the next intake will receive
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Status is the only field that changes after intake
    pub(crate) fn set_status(&mut self, id: u64, status: EvidenceStatus) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.status = status;
                true
            }
            None => false,
        }
    }

    fn push(&mut self, mut item: EvidenceItem) -> Result<EvidenceItem> {
        let next_id = self.next_id.checked_add(1).ok_or_else(|| CustodyError::Corrupt {
            path: item.absolute_path.clone(),
            reason: "evidence id space exhausted".to_string(),
        })?;
        item.id = self.next_id;
        self.next_id = next_id;
        self.items.push(item.clone());
        Ok(item)
    }

    /// Recursively catalog every regular file under `root`.
    ///
    /// Hidden files and sidecar files are skipped. A `.log` or hash file
    /// counts as a sidecar only when the artifact it describes is present. Entries are visited in
    /// file-name order, so ids follow that order. A file that cannot be read
    /// is logged and reported in [`ScanOutcome::failures`]; it never aborts
    /// the scan and never consumes an id.
    pub fn scan_directory(
        &mut self,
        root: impl AsRef<Path>,
        config: &CustodyConfig,
        progress: Option<&dyn Fn(ScanProgress)>,
    ) -> Result<ScanOutcome> {
        let root = root.as_ref();
        let root_abs = match root.canonicalize() {
            Ok(path) if path.is_dir() => path,
            Ok(_) => {
                return Err(CustodyError::FileNotFound {
                    path: root.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CustodyError::FileNotFound {
                    path: root.to_path_buf(),
                })
            }
            Err(e) => return Err(CustodyError::io(root, e)),
        };

        tracing::info!("Scanning evidence directory {}", root_abs.display());

        let excluded = config.excluded_suffixes();
        let options = HashOptions {
            chunk_size: config.chunk_size,
            cancel: None,
        };
        let mut outcome = ScanOutcome::default();
        let mut bytes_hashed = 0u64;

        for entry in WalkDir::new(&root_abs)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root_abs.clone());
                    tracing::warn!("Could not read {}: {}", path.display(), e);
                    outcome.failures.push(ScanFailure {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            if is_excluded(entry.path(), &filename, &excluded) {
                tracing::debug!("Skipping {}", entry.path().display());
                continue;
            }

            let relative_path = entry
                .path()
                .strip_prefix(&root_abs)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(&filename));

            match capture(entry.path(), relative_path, filename, None, config, &options) {
                Ok(item) => {
                    bytes_hashed += item.size;
                    let item = self.push(item)?;
                    tracing::debug!("Cataloged item {}: {}", item.id, item.relative_path.display());
                    outcome.items.push(item);
                    if let Some(report) = progress {
                        report(ScanProgress {
                            files_cataloged: outcome.items.len(),
                            bytes_hashed,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("Could not process {}: {}", entry.path().display(), e);
                    outcome.failures.push(ScanFailure {
                        path: entry.path().to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Cataloged {} evidence items ({} skipped)",
            outcome.items.len(),
            outcome.failures.len()
        );

        Ok(outcome)
    }

    /// Manually catalog a single file.
    ///
    /// The catalog is untouched unless the file exists and hashes cleanly.
    /// Paths under `evidence_root` are recorded relative to it.
    pub fn add_item(
        &mut self,
        evidence_root: &Path,
        path: impl AsRef<Path>,
        filename: Option<String>,
        description: Option<String>,
        config: &CustodyConfig,
    ) -> Result<EvidenceItem> {
        let path = path.as_ref();
        let absolute = match path.canonicalize() {
            Ok(abs) if abs.is_file() => abs,
            Ok(_) => {
                return Err(CustodyError::FileNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CustodyError::FileNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(CustodyError::io(path, e)),
        };

        let relative_path = evidence_root
            .canonicalize()
            .ok()
            .and_then(|root| absolute.strip_prefix(root).ok().map(Path::to_path_buf))
            .unwrap_or_else(|| path.to_path_buf());
        let filename = filename.unwrap_or_else(|| {
            absolute
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let options = HashOptions {
            chunk_size: config.chunk_size,
            cancel: None,
        };
        let item = capture(&absolute, relative_path, filename, description, config, &options)?;
        let item = self.push(item)?;

        tracing::info!("Evidence item {} added: {}", item.id, item.filename);
        Ok(item)
    }
}

/// Build an unnumbered item from the file's current state
fn capture(
    path: &Path,
    relative_path: PathBuf,
    filename: String,
    description: Option<String>,
    config: &CustodyConfig,
    options: &HashOptions,
) -> Result<EvidenceItem> {
    let metadata = fs::metadata(path).map_err(|e| CustodyError::io(path, e))?;
    let hash = hash_file_with(path, config.acquisition_algorithm, options)?;

    Ok(EvidenceItem {
        id: 0,
        filename,
        relative_path,
        absolute_path: path.to_path_buf(),
        size: metadata.len(),
        last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        hash,
        acquired_at: Utc::now(),
        description,
        status: EvidenceStatus::Acquired,
    })
}

fn is_excluded(path: &Path, filename: &str, suffixes: &[String]) -> bool {
    filename.starts_with('.')
        || suffixes.iter().any(|suffix| filename.ends_with(suffix.as_str()))
        || is_sidecar(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forensics::{hash_bytes, HashAlgorithm};
    use std::cell::Cell;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, data: &[u8]) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, data).unwrap();
    }

    #[test]
    fn test_scan_skips_hidden_files() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.txt", b"0123456789");
        write(temp_dir.path(), ".hidden", b"12345");

        let mut catalog = EvidenceCatalog::new();
        let outcome = catalog
            .scan_directory(temp_dir.path(), &CustodyConfig::default(), None)
            .unwrap();

        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.failures.is_empty());
        let item = &catalog.items()[0];
        assert_eq!(item.id, 1);
        assert_eq!(item.filename, "a.txt");
        assert_eq!(item.size, 10);
        assert_eq!(item.status, EvidenceStatus::Acquired);
        assert_eq!(item.hash.algorithm, HashAlgorithm::MD5);
        assert_eq!(item.hash.digest, hash_bytes(b"0123456789", HashAlgorithm::MD5));
    }

    #[test]
    fn test_scan_skips_sidecars_and_recurses() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "disk.dd", b"disk");
        write(temp_dir.path(), "disk.dd.md5", b"x  disk.dd");
        write(temp_dir.path(), "disk.dd.sha256", b"x  disk.dd");
        write(temp_dir.path(), "disk.dd.metadata.json", b"{}");
        write(temp_dir.path(), "disk.dd.log", b"log");
        write(temp_dir.path(), "CASE-1.custody.json", b"{}");
        write(temp_dir.path(), "memory/host.mem", b"mem");
        write(temp_dir.path(), "network/capture.pcap", b"pcap");

        let mut catalog = EvidenceCatalog::new();
        catalog
            .scan_directory(temp_dir.path(), &CustodyConfig::default(), None)
            .unwrap();

        let paths: Vec<PathBuf> = catalog
            .items()
            .iter()
            .map(|i| i.relative_path.clone())
            .collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("disk.dd"),
                PathBuf::from("memory/host.mem"),
                PathBuf::from("network/capture.pcap"),
            ]
        );
        let ids: Vec<u64> = catalog.items().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(catalog.items().iter().all(|i| i.absolute_path.is_absolute()));
    }

    #[test]
    fn test_scan_keeps_logs_and_hash_files_without_artifact() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "auth.log", b"sshd[812]: Accepted password for root");
        write(temp_dir.path(), "disk.dd", b"disk");
        write(temp_dir.path(), "disk.dd.log", b"dd: 4 bytes copied");
        write(temp_dir.path(), "disk.dd.md5", b"x  disk.dd");
        write(temp_dir.path(), "notes.md5", b"hand-written checksums");
        write(temp_dir.path(), "var/syslog.log", b"kernel: usb 1-1 attached");

        let mut catalog = EvidenceCatalog::new();
        let outcome = catalog
            .scan_directory(temp_dir.path(), &CustodyConfig::default(), None)
            .unwrap();

        assert!(outcome.failures.is_empty());
        let names: Vec<&str> = catalog.items().iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, vec!["auth.log", "disk.dd", "notes.md5", "syslog.log"]);
    }

    #[test]
    fn test_scan_skips_leftover_snapshot_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.txt", b"alpha");
        write(temp_dir.path(), "CASE-1.custody.json.tmp", b"{\"version\": 1");

        let mut catalog = EvidenceCatalog::new();
        catalog
            .scan_directory(temp_dir.path(), &CustodyConfig::default(), None)
            .unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.items()[0].filename, "a.txt");
    }

    #[test]
    fn test_exhausted_id_space_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.txt", b"alpha");

        let mut catalog = EvidenceCatalog::from_parts(u64::MAX, Vec::new());
        let err = catalog
            .add_item(
                temp_dir.path(),
                temp_dir.path().join("a.txt"),
                None,
                None,
                &CustodyConfig::default(),
            )
            .unwrap_err();

        assert!(matches!(err, CustodyError::Corrupt { .. }));
        assert!(catalog.is_empty());
        assert_eq!(catalog.next_id(), u64::MAX);
    }

    #[test]
    fn test_scan_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let mut catalog = EvidenceCatalog::new();
        let err = catalog
            .scan_directory(temp_dir.path().join("absent"), &CustodyConfig::default(), None)
            .unwrap_err();
        assert!(matches!(err, CustodyError::FileNotFound { .. }));
        assert!(catalog.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_does_not_abort_scan() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.bin", b"a");
        write(temp_dir.path(), "b.bin", b"b");
        write(temp_dir.path(), "c.bin", b"c");
        let locked = temp_dir.path().join("b.bin");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits; nothing to assert in that case
        if fs::File::open(&locked).is_ok() {
            return;
        }

        let mut catalog = EvidenceCatalog::new();
        let outcome = catalog
            .scan_directory(temp_dir.path(), &CustodyConfig::default(), None)
            .unwrap();

        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].path.ends_with("b.bin"));
        let ids: Vec<u64> = catalog.items().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_scan_reports_progress() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "one", b"1");
        write(temp_dir.path(), "two", b"22");

        let calls = Cell::new(0usize);
        let last_bytes = Cell::new(0u64);
        let callback = |p: ScanProgress| {
            calls.set(p.files_cataloged);
            last_bytes.set(p.bytes_hashed);
        };

        let mut catalog = EvidenceCatalog::new();
        catalog
            .scan_directory(temp_dir.path(), &CustodyConfig::default(), Some(&callback))
            .unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(last_bytes.get(), 3);
    }

    #[test]
    fn test_add_item() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "evidence/phone.img", b"nand dump");

        let mut catalog = EvidenceCatalog::new();
        let item = catalog
            .add_item(
                &temp_dir.path().join("evidence"),
                temp_dir.path().join("evidence/phone.img"),
                None,
                Some("Seized handset".to_string()),
                &CustodyConfig::strong(),
            )
            .unwrap();

        assert_eq!(item.id, 1);
        assert_eq!(item.filename, "phone.img");
        assert_eq!(item.relative_path, PathBuf::from("phone.img"));
        assert_eq!(item.description.as_deref(), Some("Seized handset"));
        assert_eq!(item.hash.algorithm, HashAlgorithm::SHA256);
        assert_eq!(catalog.next_id(), 2);
    }

    #[test]
    fn test_add_missing_item_leaves_catalog_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let mut catalog = EvidenceCatalog::new();

        let err = catalog
            .add_item(
                temp_dir.path(),
                temp_dir.path().join("nothing.dd"),
                Some("nothing.dd".to_string()),
                None,
                &CustodyConfig::default(),
            )
            .unwrap_err();

        assert!(matches!(err, CustodyError::FileNotFound { .. }));
        assert!(catalog.is_empty());
        assert_eq!(catalog.next_id(), 1);
    }

    #[test]
    fn test_duplicate_path_gets_new_id() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.txt", b"same");

        let mut catalog = EvidenceCatalog::new();
        let config = CustodyConfig::default();
        catalog.scan_directory(temp_dir.path(), &config, None).unwrap();
        let again = catalog
            .add_item(temp_dir.path(), temp_dir.path().join("a.txt"), None, None, &config)
            .unwrap();

        assert_eq!(again.id, 2);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.items()[0].absolute_path, again.absolute_path);
    }
}
