//! SQLite index of known cases
//!
//! The JSON snapshot stays the authoritative record of a case. The registry
//! only remembers where each snapshot lives and a summary of its state, so
//! cases can be listed and located without knowing their store directory.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{CaseRecord, StatusCounts};

/// SQLite database of registered cases
pub struct CaseRegistry {
    conn: Connection,
    db_path: PathBuf,
}

/// Lightweight case summary for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub case_id: String,
    pub investigator: String,
    pub created_at: DateTime<Utc>,
    pub snapshot_path: PathBuf,
    pub counts: StatusCounts,
    pub custody_entries: usize,
    pub updated_at: DateTime<Utc>,
}

type SummaryRow = (String, String, String, String, i64, i64, i64, i64, i64, i64, String);

const SUMMARY_COLUMNS: &str = "case_id, investigator, created_at, snapshot_path, \
     total_items, acquired_items, verified_items, missing_items, modified_items, \
     custody_entries, updated_at";

impl CaseRegistry {
    /// Open or create a registry at the specified path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create registry directory")?;
        }

        let conn = Connection::open(&db_path)
            .context(format!("Failed to open registry at {}", db_path.display()))?;

        let registry = Self { conn, db_path };
        registry.initialize_schema()?;

        Ok(registry)
    }

    /// Get the default registry path (~/.chainkeep/cases.db)
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".chainkeep").join("cases.db"))
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS cases (
                case_id TEXT PRIMARY KEY,
                investigator TEXT NOT NULL,
                created_at TEXT NOT NULL,
                snapshot_path TEXT NOT NULL,
                total_items INTEGER NOT NULL,
                acquired_items INTEGER NOT NULL,
                verified_items INTEGER NOT NULL,
                missing_items INTEGER NOT NULL,
                modified_items INTEGER NOT NULL,
                custody_entries INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cases_created_at
                ON cases(created_at DESC);
            "#,
            )
            .context("Failed to initialize registry schema")?;

        Ok(())
    }

    /// Insert or refresh the summary for a case
    pub fn register(&self, record: &CaseRecord, snapshot_path: &Path) -> Result<()> {
        let counts = record.status_counts();
        self.conn
            .execute(
                r#"
            INSERT OR REPLACE INTO cases (
                case_id, investigator, created_at, snapshot_path,
                total_items, acquired_items, verified_items, missing_items, modified_items,
                custody_entries, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
                params![
                    record.case_info.case_id,
                    record.case_info.primary_investigator,
                    record.case_info.created_at.to_rfc3339(),
                    snapshot_path.display().to_string(),
                    counts.total as i64,
                    counts.acquired as i64,
                    counts.verified as i64,
                    counts.missing as i64,
                    counts.modified as i64,
                    record.ledger.len() as i64,
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to register case")?;

        tracing::debug!("Registered case {} in {}", record.case_id(), self.db_path.display());
        Ok(())
    }

    pub fn lookup(&self, case_id: &str) -> Result<Option<CaseSummary>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM cases WHERE case_id = ?1", SUMMARY_COLUMNS),
                params![case_id],
                read_row,
            )
            .optional()
            .context("Failed to query registry")?;

        row.map(summary_from_row).transpose()
    }

    /// All cases, newest first. Rows that fail to parse are skipped with a warning.
    pub fn list(&self) -> Result<Vec<CaseSummary>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM cases ORDER BY created_at DESC",
            SUMMARY_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to query cases")?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let case_id = row.0.clone();
            match summary_from_row(row) {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::warn!("Skipping registry row {}: {}", case_id, e),
            }
        }
        Ok(summaries)
    }

    /// Forget a case. The snapshot file is left alone.
    pub fn remove(&self, case_id: &str) -> Result<()> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM cases WHERE case_id = ?1", params![case_id])?;

        if rows_affected == 0 {
            anyhow::bail!("Case not registered: {}", case_id);
        }
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cases", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn summary_from_row(row: SummaryRow) -> Result<CaseSummary> {
    let (
        case_id,
        investigator,
        created_at,
        snapshot_path,
        total,
        acquired,
        verified,
        missing,
        modified,
        custody_entries,
        updated_at,
    ) = row;

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .context("Invalid created_at in registry")?
        .with_timezone(&Utc);
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .context("Invalid updated_at in registry")?
        .with_timezone(&Utc);

    Ok(CaseSummary {
        case_id,
        investigator,
        created_at,
        snapshot_path: PathBuf::from(snapshot_path),
        counts: StatusCounts {
            total: total as usize,
            acquired: acquired as usize,
            verified: verified as usize,
            missing: missing as usize,
            modified: modified as usize,
        },
        custody_entries: custody_entries as usize,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Case, EvidenceStatus};
    use tempfile::TempDir;

    fn record(case_id: &str) -> CaseRecord {
        let mut record =
            CaseRecord::new(Case::new(case_id, "J. Rivera", "/evidence", None).unwrap());
        record.ledger.append("Case initialized", "J. Rivera", None);
        record
    }

    #[test]
    fn test_registry_open() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/cases.db");

        let registry = CaseRegistry::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(registry.path(), db_path);
        assert_eq!(registry.count().unwrap(), 0);
    }

    #[test]
    fn test_register_and_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let registry = CaseRegistry::open(temp_dir.path().join("cases.db")).unwrap();

        let record = record("CASE-1");
        registry
            .register(&record, Path::new("/cases/CASE-1.custody.json"))
            .unwrap();

        let summary = registry.lookup("CASE-1").unwrap().unwrap();
        assert_eq!(summary.investigator, "J. Rivera");
        assert_eq!(summary.custody_entries, 1);
        assert_eq!(summary.counts, StatusCounts::default());
        assert_eq!(
            summary.snapshot_path,
            PathBuf::from("/cases/CASE-1.custody.json")
        );
        assert!(registry.lookup("CASE-2").unwrap().is_none());
    }

    #[test]
    fn test_register_refreshes_counts() {
        let temp_dir = TempDir::new().unwrap();
        let evidence = temp_dir.path().join("evidence");
        std::fs::create_dir_all(&evidence).unwrap();
        std::fs::write(evidence.join("a.txt"), b"alpha").unwrap();

        let registry = CaseRegistry::open(temp_dir.path().join("cases.db")).unwrap();
        let mut record = record("CASE-1");
        let snapshot = temp_dir.path().join("CASE-1.custody.json");
        registry.register(&record, &snapshot).unwrap();

        record
            .catalog
            .scan_directory(&evidence, &crate::CustodyConfig::default(), None)
            .unwrap();
        record.catalog.set_status(1, EvidenceStatus::Verified);
        record.ledger.append("Integrity verification", "J. Rivera", None);
        registry.register(&record, &snapshot).unwrap();

        assert_eq!(registry.count().unwrap(), 1);
        let summary = registry.lookup("CASE-1").unwrap().unwrap();
        assert_eq!(summary.counts.total, 1);
        assert_eq!(summary.counts.verified, 1);
        assert_eq!(summary.custody_entries, 2);
    }

    #[test]
    fn test_list_newest_first_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let registry = CaseRegistry::open(temp_dir.path().join("cases.db")).unwrap();

        let older = {
            let mut r = record("CASE-OLD");
            r.case_info.created_at = Utc::now() - chrono::Duration::days(30);
            r
        };
        let newer = record("CASE-NEW");
        registry.register(&older, Path::new("old.json")).unwrap();
        registry.register(&newer, Path::new("new.json")).unwrap();

        let ids: Vec<String> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.case_id)
            .collect();
        assert_eq!(ids, vec!["CASE-NEW".to_string(), "CASE-OLD".to_string()]);

        registry.remove("CASE-OLD").unwrap();
        assert_eq!(registry.count().unwrap(), 1);
        assert!(registry.remove("CASE-OLD").is_err());
    }
}
