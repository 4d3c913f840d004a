//! Case session: one open case and the operations that change it
//!
//! Every mutating call records exactly one custody entry and then persists
//! the snapshot before returning. Operations that fail before changing the
//! case leave both the record and the ledger untouched.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::catalog::{ScanOutcome, ScanProgress};
use crate::config::CustodyConfig;
use crate::error::{CustodyError, Result};
use crate::forensics::{check_sidecars, hash_file_with, HashAlgorithm, HashOptions, SidecarReport};
use crate::ledger::CustodyLogEntry;
use crate::report::{self, CaseReport};
use crate::store::{self, CaseStore};
use crate::verify::{verify_all, VerificationOutcome, VerifyOptions, VerifyProgress};
use crate::{Case, CaseRecord, ContentHash, EvidenceItem};

/// Number of skipped paths spelled out in the intake entry
const MAX_LISTED_FAILURES: usize = 20;

pub struct CaseSession {
    record: CaseRecord,
    config: CustodyConfig,
    snapshot_path: PathBuf,
}

impl CaseSession {
    /// Create a new case, catalog its evidence root and persist it.
    ///
    /// Fails with [`CustodyError::CaseExists`] rather than overwrite an
    /// existing snapshot and its ledger.
    pub fn initialize(
        case_id: &str,
        investigator: &str,
        evidence_root: impl AsRef<Path>,
        description: Option<String>,
        config: CustodyConfig,
        store_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        Self::initialize_with_progress(
            case_id,
            investigator,
            evidence_root,
            description,
            config,
            store_dir,
            None,
        )
    }

    pub fn initialize_with_progress(
        case_id: &str,
        investigator: &str,
        evidence_root: impl AsRef<Path>,
        description: Option<String>,
        config: CustodyConfig,
        store_dir: impl AsRef<Path>,
        progress: Option<&dyn Fn(ScanProgress)>,
    ) -> Result<Self> {
        let evidence_root = evidence_root.as_ref();
        let store = CaseStore::new(store_dir);
        let snapshot_path = store.snapshot_path(case_id)?;
        if snapshot_path.exists() {
            return Err(CustodyError::CaseExists {
                case_id: case_id.to_string(),
                path: snapshot_path,
            });
        }

        let evidence_root = evidence_root
            .canonicalize()
            .unwrap_or_else(|_| evidence_root.to_path_buf());
        let case = Case::new(case_id, investigator, &evidence_root, description)?;
        let mut record = CaseRecord::new(case);

        tracing::info!("Initializing case {} for {}", case_id, investigator);
        record.ledger.append(
            "Case initialized",
            investigator,
            Some(format!(
                "Evidence root: {}; algorithm: {}",
                evidence_root.display(),
                config.acquisition_algorithm.name()
            )),
        );

        let details = if evidence_root.is_dir() {
            let outcome = record
                .catalog
                .scan_directory(&evidence_root, &config, progress)?;
            intake_details(&outcome)
        } else {
            tracing::warn!(
                "Evidence root {} does not exist; case starts empty",
                evidence_root.display()
            );
            format!("Evidence root {} not found; 0 items", evidence_root.display())
        };
        record
            .ledger
            .append("Evidence cataloged", investigator, Some(details));

        let session = Self {
            record,
            config,
            snapshot_path,
        };
        session.save()?;
        Ok(session)
    }

    /// Open the case saved under `store_dir`
    pub fn open(store_dir: impl AsRef<Path>, case_id: &str, config: CustodyConfig) -> Result<Self> {
        let store = CaseStore::new(store_dir);
        let record = store.load(case_id)?;
        Ok(Self {
            record,
            config,
            snapshot_path: store.snapshot_path(case_id)?,
        })
    }

    /// Open a case from an explicit snapshot file
    pub fn open_snapshot(snapshot_path: impl AsRef<Path>, config: CustodyConfig) -> Result<Self> {
        let snapshot_path = snapshot_path.as_ref().to_path_buf();
        let record = store::load_from(&snapshot_path)?;
        Ok(Self {
            record,
            config,
            snapshot_path,
        })
    }

    pub fn record(&self) -> &CaseRecord {
        &self.record
    }

    pub fn case(&self) -> &Case {
        &self.record.case_info
    }

    pub fn config(&self) -> &CustodyConfig {
        &self.config
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    fn save(&self) -> Result<()> {
        store::save_to(&self.record, &self.snapshot_path)
    }

    /// Manually catalog one file
    pub fn add_evidence(
        &mut self,
        path: impl AsRef<Path>,
        filename: Option<String>,
        description: Option<String>,
        person: &str,
    ) -> Result<EvidenceItem> {
        let item = self.record.catalog.add_item(
            &self.record.case_info.evidence_root,
            path,
            filename,
            description,
            &self.config,
        )?;

        self.record.ledger.append(
            "Evidence added",
            person,
            Some(format!(
                "Item #{}: {} ({})",
                item.id,
                item.relative_path.display(),
                item.hash
            )),
        );
        self.save()?;
        Ok(item)
    }

    /// Record an action taken outside the system (transfer, storage, review)
    pub fn add_custody_entry(
        &mut self,
        action: &str,
        person: &str,
        details: Option<String>,
    ) -> Result<CustodyLogEntry> {
        let entry = self.record.ledger.append(action, person, details);
        self.save()?;
        Ok(entry)
    }

    pub fn verify(&mut self, person: &str, options: &VerifyOptions) -> Result<VerificationOutcome> {
        self.verify_with_progress(person, options, None)
    }

    /// Run a verification pass and record it in the ledger.
    ///
    /// A cancelled pass keeps the statuses it decided and is recorded as
    /// interrupted, summarizing only the decided items.
    pub fn verify_with_progress(
        &mut self,
        person: &str,
        options: &VerifyOptions,
        progress: Option<&(dyn Fn(VerifyProgress) + Sync)>,
    ) -> Result<VerificationOutcome> {
        tracing::info!(
            "Verifying {} evidence items for case {}",
            self.record.catalog.len(),
            self.record.case_id()
        );
        let outcome = verify_all(&mut self.record.catalog, options, progress);

        let action = if outcome.cancelled {
            "Integrity verification interrupted"
        } else if outcome.all_passed {
            "Integrity verification passed"
        } else {
            "Integrity verification failed"
        };
        let mut details = outcome.summary();
        for issue in &outcome.issues {
            details.push_str(&format!("; {}", issue));
        }

        self.record.ledger.append(action, person, Some(details));
        self.save()?;
        Ok(outcome)
    }

    /// Replace the case description; the old text stays in the ledger
    pub fn amend_description(&mut self, description: &str, person: &str) -> Result<CustodyLogEntry> {
        let previous = std::mem::replace(
            &mut self.record.case_info.description,
            description.to_string(),
        );
        let entry = self.record.ledger.append(
            "Case description amended",
            person,
            Some(format!("From {:?} to {:?}", previous, description)),
        );
        self.save()?;
        Ok(entry)
    }

    /// Hash one item with another algorithm without changing its record
    pub fn compute_digest(
        &mut self,
        item_id: u64,
        algorithm: HashAlgorithm,
        person: &str,
    ) -> Result<ContentHash> {
        let item = self
            .record
            .catalog
            .get(item_id)
            .ok_or(CustodyError::UnknownItem(item_id))?;
        let options = HashOptions {
            chunk_size: self.config.chunk_size,
            cancel: None,
        };
        let hash = hash_file_with(&item.absolute_path, algorithm, &options)?;

        let details = format!("Item #{}: {}", item_id, hash);
        self.record
            .ledger
            .append("Digest computed", person, Some(details));
        self.save()?;
        Ok(hash)
    }

    /// Check an item's acquisition sidecars against its file and catalog record
    pub fn check_item_sidecars(
        &self,
        item_id: u64,
        algorithm: Option<HashAlgorithm>,
    ) -> Result<SidecarReport> {
        let item = self
            .record
            .catalog
            .get(item_id)
            .ok_or(CustodyError::UnknownItem(item_id))?;
        let mut report = check_sidecars(&item.absolute_path, algorithm)?;
        report.cross_check_catalog(item.size);
        Ok(report)
    }

    pub fn report(&self) -> CaseReport {
        report::generate_now(&self.record)
    }

    pub fn report_at(&self, generated_at: DateTime<Utc>) -> CaseReport {
        report::generate(&self.record, generated_at)
    }
}

fn intake_details(outcome: &ScanOutcome) -> String {
    let mut details = format!(
        "{} items cataloged, {} skipped",
        outcome.items.len(),
        outcome.failures.len()
    );
    if !outcome.failures.is_empty() {
        let listed: Vec<String> = outcome
            .failures
            .iter()
            .take(MAX_LISTED_FAILURES)
            .map(|f| f.path.display().to_string())
            .collect();
        details.push_str(&format!(": {}", listed.join(", ")));
        if outcome.failures.len() > MAX_LISTED_FAILURES {
            details.push_str(&format!(
                " and {} more",
                outcome.failures.len() - MAX_LISTED_FAILURES
            ));
        }
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::forensics::{write_hash_sidecar, CheckStatus};
    use crate::EvidenceStatus;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        evidence: PathBuf,
        store: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let evidence = temp_dir.path().join("evidence");
        let store = temp_dir.path().join("cases");
        fs::create_dir_all(&evidence).unwrap();
        fs::write(evidence.join("a.txt"), b"0123456789").unwrap();
        fs::write(evidence.join(".hidden"), b"12345").unwrap();
        Fixture {
            _temp_dir: temp_dir,
            evidence,
            store,
        }
    }

    fn init(f: &Fixture) -> CaseSession {
        CaseSession::initialize(
            "CASE-1",
            "J. Rivera",
            &f.evidence,
            None,
            CustodyConfig::default(),
            &f.store,
        )
        .unwrap()
    }

    fn actions(session: &CaseSession) -> Vec<String> {
        session
            .record()
            .ledger
            .entries()
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }

    #[test]
    fn test_initialize_catalogs_and_saves() {
        let f = fixture();
        let session = init(&f);

        let items = session.record().catalog.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].filename, "a.txt");
        assert_eq!(items[0].status, EvidenceStatus::Acquired);
        assert_eq!(actions(&session), vec!["Case initialized", "Evidence cataloged"]);
        assert!(session.snapshot_path().is_file());

        let reopened = CaseSession::open(&f.store, "CASE-1", CustodyConfig::default()).unwrap();
        assert_eq!(reopened.record(), session.record());
    }

    #[test]
    fn test_initialize_refuses_existing_case() {
        let f = fixture();
        init(&f);
        let again = CaseSession::initialize(
            "CASE-1",
            "Someone Else",
            &f.evidence,
            None,
            CustodyConfig::default(),
            &f.store,
        );
        assert!(matches!(again, Err(CustodyError::CaseExists { .. })));
    }

    #[test]
    fn test_initialize_without_evidence_root() {
        let f = fixture();
        let session = CaseSession::initialize(
            "CASE-2",
            "J. Rivera",
            f.evidence.join("not-yet"),
            Some("Pending seizure".into()),
            CustodyConfig::default(),
            &f.store,
        )
        .unwrap();
        assert!(session.record().catalog.is_empty());
        assert_eq!(session.case().description, "Pending seizure");
        assert_eq!(session.record().ledger.len(), 2);
    }

    #[test]
    fn test_every_mutation_appends_one_entry() {
        let f = fixture();
        let mut session = init(&f);
        fs::write(f.evidence.join("b.bin"), b"beta").unwrap();

        session
            .add_evidence(f.evidence.join("b.bin"), None, Some("USB".into()), "J. Rivera")
            .unwrap();
        assert_eq!(session.record().ledger.len(), 3);

        session
            .add_custody_entry("Transferred to lab", "A. Chen", None)
            .unwrap();
        assert_eq!(session.record().ledger.len(), 4);

        session.verify("A. Chen", &VerifyOptions::default()).unwrap();
        assert_eq!(session.record().ledger.len(), 5);

        session.amend_description("Laptop seizure", "J. Rivera").unwrap();
        assert_eq!(session.record().ledger.len(), 6);

        session
            .compute_digest(1, HashAlgorithm::SHA256, "A. Chen")
            .unwrap();
        assert_eq!(session.record().ledger.len(), 7);

        let ids: Vec<u64> = session.record().ledger.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());

        let saved = CaseSession::open(&f.store, "CASE-1", CustodyConfig::default()).unwrap();
        assert_eq!(saved.record(), session.record());
    }

    #[test]
    fn test_failed_intake_changes_nothing() {
        let f = fixture();
        let mut session = init(&f);
        let before = session.record().clone();

        let result = session.add_evidence(f.evidence.join("nope.bin"), None, None, "J. Rivera");
        assert!(matches!(result, Err(CustodyError::FileNotFound { .. })));
        assert_eq!(session.record(), &before);

        let result = session.compute_digest(99, HashAlgorithm::SHA1, "J. Rivera");
        assert!(matches!(result, Err(CustodyError::UnknownItem(99))));
        assert_eq!(session.record(), &before);
    }

    #[test]
    fn test_verify_records_outcome() {
        let f = fixture();
        let mut session = init(&f);

        let outcome = session.verify("A. Chen", &VerifyOptions::default()).unwrap();
        assert!(outcome.all_passed);
        assert_eq!(
            session.record().ledger.last().unwrap().action,
            "Integrity verification passed"
        );

        fs::remove_file(f.evidence.join("a.txt")).unwrap();
        let outcome = session.verify("A. Chen", &VerifyOptions::default()).unwrap();
        assert!(!outcome.all_passed);
        assert_eq!(outcome.issues[0].item_id, 1);
        let last = session.record().ledger.last().unwrap();
        assert_eq!(last.action, "Integrity verification failed");
        assert!(last.details.as_deref().unwrap().contains("File missing"));
        assert_eq!(
            session.record().catalog.get(1).unwrap().status,
            EvidenceStatus::Missing
        );
    }

    #[test]
    fn test_cancelled_verify_is_recorded_as_interrupted() {
        let f = fixture();
        let mut session = init(&f);
        let token = CancelToken::new();
        token.cancel();

        let outcome = session
            .verify(
                "A. Chen",
                &VerifyOptions {
                    cancel: Some(token),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(outcome.cancelled);
        let last = session.record().ledger.last().unwrap();
        assert_eq!(last.action, "Integrity verification interrupted");
        assert!(last.details.as_deref().unwrap().starts_with("0 items checked"));
        assert_eq!(
            session.record().catalog.get(1).unwrap().status,
            EvidenceStatus::Acquired
        );
    }

    #[test]
    fn test_verify_interrupted_midway_records_decided_items() {
        let f = fixture();
        fs::write(f.evidence.join("b.txt"), b"beta").unwrap();
        fs::write(f.evidence.join("c.txt"), b"gamma").unwrap();
        let mut session = init(&f);
        let entries_before = session.record().ledger.len();

        let token = CancelToken::new();
        let trigger = token.clone();
        let callback = move |p: VerifyProgress| {
            if p.completed == 1 {
                trigger.cancel();
            }
        };
        let outcome = session
            .verify_with_progress(
                "A. Chen",
                &VerifyOptions {
                    workers: 1,
                    cancel: Some(token),
                    ..Default::default()
                },
                Some(&callback),
            )
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.decided(), 1);
        assert_eq!(outcome.undecided.len(), 2);

        let statuses: Vec<EvidenceStatus> = session
            .record()
            .catalog
            .items()
            .iter()
            .map(|i| i.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                EvidenceStatus::Verified,
                EvidenceStatus::Acquired,
                EvidenceStatus::Acquired
            ]
        );

        assert_eq!(session.record().ledger.len(), entries_before + 1);
        let last = session.record().ledger.last().unwrap();
        assert_eq!(last.action, "Integrity verification interrupted");
        assert_eq!(
            last.details.as_deref(),
            Some("1 items checked: 1 verified, 0 missing, 0 modified, 2 not reached")
        );

        let reopened = CaseSession::open(&f.store, "CASE-1", CustodyConfig::default()).unwrap();
        assert_eq!(reopened.record(), session.record());
    }

    #[test]
    fn test_amend_description_keeps_history() {
        let f = fixture();
        let mut session = init(&f);
        let original = session.case().description.clone();

        let entry = session.amend_description("Laptop seizure", "J. Rivera").unwrap();
        assert_eq!(session.case().description, "Laptop seizure");
        assert!(entry.details.unwrap().contains(&original));
    }

    #[test]
    fn test_compute_digest_leaves_record_hash() {
        let f = fixture();
        let mut session = init(&f);
        let recorded = session.record().catalog.get(1).unwrap().hash.clone();

        let digest = session
            .compute_digest(1, HashAlgorithm::SHA256, "A. Chen")
            .unwrap();
        assert_eq!(digest.algorithm, HashAlgorithm::SHA256);
        assert_eq!(digest.digest.len(), 64);
        assert_eq!(session.record().catalog.get(1).unwrap().hash, recorded);
    }

    #[test]
    fn test_item_sidecars_cross_checked() {
        let f = fixture();
        let session = init(&f);
        let item = session.record().catalog.get(1).unwrap().clone();
        write_hash_sidecar(&item.absolute_path, &item.hash).unwrap();

        let report = session.check_item_sidecars(1, None).unwrap();
        assert_eq!(report.hash, CheckStatus::Passed);
        assert!(report.passed());
        assert!(matches!(report.catalog, CheckStatus::Skipped(_)));
    }

    #[test]
    fn test_report_reflects_session() {
        let f = fixture();
        let session = init(&f);
        let report = session.report();
        assert_eq!(report.case.case_id, "CASE-1");
        assert_eq!(report.summary.items.acquired, 1);
        assert_eq!(report.summary.custody_entries, 2);
    }

    #[test]
    fn test_intake_details_lists_skipped_paths() {
        let outcome = ScanOutcome {
            items: Vec::new(),
            failures: (0..25)
                .map(|i| crate::catalog::ScanFailure {
                    path: PathBuf::from(format!("/e/f{}", i)),
                    reason: "denied".into(),
                })
                .collect(),
        };
        let details = intake_details(&outcome);
        assert!(details.starts_with("0 items cataloged, 25 skipped: /e/f0, /e/f1"));
        assert!(details.ends_with("and 5 more"));
    }
}
