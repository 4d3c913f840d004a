//! Case snapshot persistence
//!
//! One pretty-printed JSON file per case, `<case_id>.custody.json`, holding
//! the case metadata, the evidence catalog and the custody ledger. Loading
//! checks the id invariants before anything is handed back, so a damaged
//! snapshot is rejected whole rather than partially restored.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::catalog::EvidenceCatalog;
use crate::error::{CustodyError, Result};
use crate::forensics::sidecar::{sidecar_path, CUSTODY_SUFFIX, TMP_SUFFIX};
use crate::ledger::{CustodyLedger, CustodyLogEntry};
use crate::{validate_case_id, Case, CaseRecord, EvidenceItem};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    case_info: &'a Case,
    next_item_id: u64,
    evidence_items: &'a [EvidenceItem],
    custody_log: &'a [CustodyLogEntry],
}

#[derive(Deserialize)]
struct SnapshotIn {
    version: u32,
    case_info: Case,
    next_item_id: u64,
    evidence_items: Vec<EvidenceItem>,
    custody_log: Vec<CustodyLogEntry>,
}

/// Directory of case snapshots
#[derive(Debug, Clone)]
pub struct CaseStore {
    dir: PathBuf,
}

impl CaseStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot location for `case_id`
    pub fn snapshot_path(&self, case_id: &str) -> Result<PathBuf> {
        validate_case_id(case_id)?;
        Ok(sidecar_path(&self.dir.join(case_id), CUSTODY_SUFFIX))
    }

    pub fn exists(&self, case_id: &str) -> bool {
        self.snapshot_path(case_id)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Persist `record` under the store directory
    pub fn save(&self, record: &CaseRecord) -> Result<PathBuf> {
        let path = self.snapshot_path(record.case_id())?;
        fs::create_dir_all(&self.dir).map_err(|e| CustodyError::io(&self.dir, e))?;
        save_to(record, &path)?;
        Ok(path)
    }

    pub fn load(&self, case_id: &str) -> Result<CaseRecord> {
        let path = self.snapshot_path(case_id)?;
        let record = load_from(&path)?;
        if record.case_id() != case_id {
            return Err(CustodyError::Corrupt {
                path,
                reason: format!(
                    "snapshot holds case {:?}, expected {:?}",
                    record.case_id(),
                    case_id
                ),
            });
        }
        Ok(record)
    }
}

/// Write a snapshot to `path`.
///
/// The snapshot is written beside the target and renamed over it, so
/// readers see either the old or the new snapshot, never a torn one.
pub fn save_to(record: &CaseRecord, path: &Path) -> Result<()> {
    let snapshot = SnapshotOut {
        version: SNAPSHOT_VERSION,
        case_info: &record.case_info,
        next_item_id: record.catalog.next_id(),
        evidence_items: record.catalog.items(),
        custody_log: record.ledger.entries(),
    };
    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| CustodyError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let tmp_path = sidecar_path(path, TMP_SUFFIX);
    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp_path);
        return Err(CustodyError::io(path, e));
    }

    tracing::info!("Saved case {} to {}", record.case_id(), path.display());
    Ok(())
}

/// Read and validate a snapshot from `path`
pub fn load_from(path: &Path) -> Result<CaseRecord> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CustodyError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            return Err(CustodyError::Corrupt {
                path: path.to_path_buf(),
                reason: "snapshot is not valid UTF-8".to_string(),
            })
        }
        Err(e) => return Err(CustodyError::io(path, e)),
    };

    let corrupt = |reason: String| CustodyError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let snapshot: SnapshotIn = serde_json::from_str(&json).map_err(|e| corrupt(e.to_string()))?;
    validate(&snapshot).map_err(corrupt)?;

    tracing::info!(
        "Loaded case {} ({} items, {} custody entries)",
        snapshot.case_info.case_id,
        snapshot.evidence_items.len(),
        snapshot.custody_log.len()
    );

    Ok(CaseRecord {
        case_info: snapshot.case_info,
        catalog: EvidenceCatalog::from_parts(snapshot.next_item_id, snapshot.evidence_items),
        ledger: CustodyLedger::from_entries(snapshot.custody_log),
    })
}

fn validate(snapshot: &SnapshotIn) -> std::result::Result<(), String> {
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(format!("unsupported snapshot version {}", snapshot.version));
    }
    validate_case_id(&snapshot.case_info.case_id).map_err(|e| e.to_string())?;

    let mut previous = 0u64;
    for item in &snapshot.evidence_items {
        if item.id <= previous {
            return Err(format!("evidence id {} out of sequence", item.id));
        }
        if item.hash.digest.len() != item.hash.algorithm.hex_len()
            || !item.hash.digest.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(format!("evidence id {} has a malformed digest", item.id));
        }
        previous = item.id;
    }
    if snapshot.next_item_id <= previous || snapshot.next_item_id == 0 {
        return Err(format!(
            "next evidence id {} would reuse an existing id",
            snapshot.next_item_id
        ));
    }
    if snapshot.next_item_id == u64::MAX {
        return Err("next evidence id leaves no room for further intake".to_string());
    }

    for (index, entry) in snapshot.custody_log.iter().enumerate() {
        if entry.id != index as u64 + 1 {
            return Err(format!(
                "custody entry {} found at position {}",
                entry.id,
                index + 1
            ));
        }
    }

    Ok(())
}
