//! Chain of custody report
//!
//! A read-only projection of a [`CaseRecord`]. Everything except
//! `generated_at` is derived from the record, so two reports of an unchanged
//! case differ only in that field.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::ledger::CustodyLogEntry;
use crate::{CaseRecord, ContentHash, EvidenceStatus, StatusCounts};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseReport {
    pub generated_at: DateTime<Utc>,
    pub case: CaseSection,
    pub items: Vec<ItemSection>,
    pub custody_log: Vec<CustodyLogEntry>,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseSection {
    pub case_id: String,
    pub primary_investigator: String,
    pub created_at: DateTime<Utc>,
    pub evidence_root: PathBuf,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSection {
    pub id: u64,
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub hash: ContentHash,
    pub acquired_at: DateTime<Utc>,
    pub status: EvidenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub items: StatusCounts,
    pub custody_entries: usize,
    /// Ids of items last found missing or modified
    pub integrity_issues: Vec<u64>,
}

impl ReportSummary {
    pub fn has_integrity_issues(&self) -> bool {
        !self.integrity_issues.is_empty()
    }
}

/// Build a report stamped with `generated_at`
pub fn generate(record: &CaseRecord, generated_at: DateTime<Utc>) -> CaseReport {
    let case = &record.case_info;
    let items: Vec<ItemSection> = record
        .catalog
        .items()
        .iter()
        .map(|item| ItemSection {
            id: item.id,
            filename: item.filename.clone(),
            path: item.relative_path.clone(),
            size_bytes: item.size,
            size_mb: (item.size_mb() * 100.0).round() / 100.0,
            hash: item.hash.clone(),
            acquired_at: item.acquired_at,
            status: item.status,
            description: item.description.clone(),
        })
        .collect();

    let integrity_issues = items
        .iter()
        .filter(|item| {
            matches!(
                item.status,
                EvidenceStatus::Missing | EvidenceStatus::Modified
            )
        })
        .map(|item| item.id)
        .collect();

    CaseReport {
        generated_at,
        case: CaseSection {
            case_id: case.case_id.clone(),
            primary_investigator: case.primary_investigator.clone(),
            created_at: case.created_at,
            evidence_root: case.evidence_root.clone(),
            description: case.description.clone(),
        },
        summary: ReportSummary {
            items: record.status_counts(),
            custody_entries: record.ledger.len(),
            integrity_issues,
        },
        items,
        custody_log: record.ledger.entries().to_vec(),
    }
}

pub fn generate_now(record: &CaseRecord) -> CaseReport {
    generate(record, Utc::now())
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl CaseReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text rendering for printing or filing with the case
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "DIGITAL EVIDENCE CHAIN OF CUSTODY REPORT")?;
        writeln!(out, "{}", "=".repeat(50))?;
        writeln!(out)?;

        writeln!(out, "CASE INFORMATION:")?;
        writeln!(out, "Case ID: {}", self.case.case_id)?;
        writeln!(out, "Primary Investigator: {}", self.case.primary_investigator)?;
        writeln!(out, "Created Date: {}", timestamp(&self.case.created_at))?;
        writeln!(out, "Evidence Location: {}", self.case.evidence_root.display())?;
        writeln!(out, "Description: {}", self.case.description)?;
        writeln!(out)?;

        writeln!(out, "EVIDENCE ITEMS:")?;
        writeln!(out, "{}", "-".repeat(30))?;
        if self.items.is_empty() {
            writeln!(out, "(none)")?;
            writeln!(out)?;
        }
        for item in &self.items {
            writeln!(out, "Item #{}: {}", item.id, item.filename)?;
            writeln!(out, "  Path: {}", item.path.display())?;
            writeln!(out, "  Size: {} bytes ({:.2} MB)", item.size_bytes, item.size_mb)?;
            writeln!(
                out,
                "  {} Hash: {}",
                item.hash.algorithm.name(),
                item.hash.digest
            )?;
            writeln!(out, "  Acquired: {}", timestamp(&item.acquired_at))?;
            writeln!(out, "  Status: {}", item.status)?;
            if let Some(description) = &item.description {
                writeln!(out, "  Description: {}", description)?;
            }
            writeln!(out)?;
        }

        writeln!(out, "CUSTODY LOG:")?;
        writeln!(out, "{}", "-".repeat(20))?;
        for entry in &self.custody_log {
            writeln!(out, "#{} [{}] {}", entry.id, timestamp(&entry.timestamp), entry.action)?;
            writeln!(out, "  Person: {}", entry.person)?;
            if let Some(details) = &entry.details {
                writeln!(out, "  Details: {}", details)?;
            }
            writeln!(out)?;
        }

        let counts = &self.summary.items;
        writeln!(out, "SUMMARY:")?;
        writeln!(out, "{}", "-".repeat(15))?;
        writeln!(out, "Total Evidence Items: {}", counts.total)?;
        writeln!(out, "Total Custody Entries: {}", self.summary.custody_entries)?;
        writeln!(out, "Acquired Items: {}", counts.acquired)?;
        writeln!(out, "Verified Items: {}", counts.verified)?;
        writeln!(out, "Missing Items: {}", counts.missing)?;
        writeln!(out, "Modified Items: {}", counts.modified)?;

        if self.summary.has_integrity_issues() {
            writeln!(out)?;
            writeln!(out, "INTEGRITY ISSUES:")?;
            writeln!(out, "{}", "-".repeat(20))?;
            for id in &self.summary.integrity_issues {
                if let Some(item) = self.items.iter().find(|item| item.id == *id) {
                    writeln!(
                        out,
                        "Item #{} ({}) is {}",
                        item.id,
                        item.path.display(),
                        item.status
                    )?;
                }
            }
        }

        writeln!(out)?;
        writeln!(out, "Report Generated: {}", timestamp(&self.generated_at))?;
        Ok(())
    }
}
