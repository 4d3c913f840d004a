/// Append-only chain of custody ledger
///
/// Every action taken on a case is recorded here: who did what, when.
/// Entries are numbered 1..N in append order and are never edited or
/// removed, so the full history of a case can always be reconstructed.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CustodyError, Result};

/// Single custody log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyLogEntry {
    /// Sequential entry ID, starting at 1
    pub id: u64,

    /// Timestamp (UTC)
    pub timestamp: DateTime<Utc>,

    /// What was done
    pub action: String,

    /// Who is responsible
    pub person: String,

    /// Free-text details
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<String>,
}

/// The custody ledger of one case.
///
/// Appending takes `&mut self`, so there is exactly one writer at a time
/// and ids stay strictly monotonic and gap-free.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustodyLedger {
    entries: Vec<CustodyLogEntry>,
}

impl CustodyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries; the store validates numbering first
    pub(crate) fn from_entries(entries: Vec<CustodyLogEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry and return a copy of it
    pub fn append(
        &mut self,
        action: impl Into<String>,
        person: impl Into<String>,
        details: Option<String>,
    ) -> CustodyLogEntry {
        let entry = CustodyLogEntry {
            id: self.entries.len() as u64 + 1,
            timestamp: Utc::now(),
            action: action.into(),
            person: person.into(),
            details: details.filter(|d| !d.is_empty()),
        };

        tracing::info!(
            entry_id = entry.id,
            person = %entry.person,
            "Custody entry: {}",
            entry.action
        );

        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[CustodyLogEntry] {
        &self.entries
    }

    pub fn get(&self, id: u64) -> Option<&CustodyLogEntry> {
        id.checked_sub(1)
            .and_then(|index| self.entries.get(index as usize))
    }

    pub fn last(&self) -> Option<&CustodyLogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries recorded by `person`, in append order
    pub fn entries_by_person(&self, person: &str) -> Vec<&CustodyLogEntry> {
        self.entries.iter().filter(|e| e.person == person).collect()
    }

    /// Export to JSON
    pub fn export_json(&self, output_path: impl AsRef<Path>) -> Result<()> {
        let path = output_path.as_ref();
        let json = serde_json::to_string_pretty(&self.entries).map_err(|e| CustodyError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| CustodyError::io(path, e))
    }

    /// Export to CSV
    pub fn export_csv(&self, output_path: impl AsRef<Path>) -> Result<()> {
        let path = output_path.as_ref();
        let mut csv = String::from("ID,Timestamp,Action,Person,Details\n");

        for entry in &self.entries {
            csv.push_str(&format!(
                "{},{},{},{},{}\n",
                entry.id,
                entry.timestamp.to_rfc3339(),
                csv_field(&entry.action),
                csv_field(&entry.person),
                csv_field(entry.details.as_deref().unwrap_or("")),
            ));
        }

        std::fs::write(path, csv).map_err(|e| CustodyError::io(path, e))
    }

    /// Get statistics
    pub fn statistics(&self) -> LedgerStatistics {
        let mut entries_per_person = BTreeMap::new();
        for entry in &self.entries {
            *entries_per_person.entry(entry.person.clone()).or_insert(0) += 1;
        }

        LedgerStatistics {
            total_entries: self.entries.len(),
            entries_per_person,
            first_entry_time: self.entries.first().map(|e| e.timestamp),
            last_entry_time: self.entries.last().map(|e| e.timestamp),
        }
    }
}

/// Ledger statistics
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStatistics {
    pub total_entries: usize,
    pub entries_per_person: BTreeMap<String, usize>,
    pub first_entry_time: Option<DateTime<Utc>>,
    pub last_entry_time: Option<DateTime<Utc>>,
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
