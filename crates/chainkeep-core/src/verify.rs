//! Integrity verification passes over a catalog
//!
//! Each item's new status is a pure function of its recorded hash and the
//! file currently at its path; the previous status plays no part. Items are
//! independent, so a pass fans out over a bounded worker pool and merges
//! results by item id, giving the same outcome as a sequential pass.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::catalog::EvidenceCatalog;
use crate::config::CustodyConfig;
use crate::error::CustodyError;
use crate::forensics::{hash_file_with, HashOptions};
use crate::{ContentHash, EvidenceStatus};

/// Options for one verification pass
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Worker threads; zero means available parallelism
    pub workers: usize,
    pub chunk_size: usize,
    pub cancel: Option<CancelToken>,
    /// Deadline for the whole pass
    pub timeout: Option<Duration>,
}

impl VerifyOptions {
    pub fn from_config(config: &CustodyConfig) -> Self {
        Self {
            workers: config.workers(),
            chunk_size: config.chunk_size,
            cancel: None,
            timeout: config.verify_timeout(),
        }
    }

    fn token(&self) -> Option<CancelToken> {
        match (&self.cancel, self.timeout) {
            (Some(token), Some(timeout)) => Some(token.bounded(timeout)),
            (Some(token), None) => Some(token.clone()),
            (None, Some(timeout)) => Some(CancelToken::with_timeout(timeout)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerifyProgress {
    pub completed: usize,
    pub total: usize,
}

/// Result of re-examining one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Verified,
    Missing,
    Modified { actual: ContentHash },
    /// File exists but could not be read to the end; its content can no
    /// longer be shown to match, so it resolves as modified
    ReadError(String),
    /// Pass was cancelled before this item was decided
    Interrupted,
}

impl Evaluation {
    /// New status, if this evaluation decides one
    pub fn status(&self) -> Option<EvidenceStatus> {
        match self {
            Evaluation::Verified => Some(EvidenceStatus::Verified),
            Evaluation::Missing => Some(EvidenceStatus::Missing),
            Evaluation::Modified { .. } | Evaluation::ReadError(_) => {
                Some(EvidenceStatus::Modified)
            }
            Evaluation::Interrupted => None,
        }
    }
}

/// Decide an item's status from its recorded hash and the file at `path`.
///
/// The file is re-hashed with the recorded algorithm.
pub fn evaluate(recorded: &ContentHash, path: &Path, options: &HashOptions) -> Evaluation {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        _ => return Evaluation::Missing,
    }

    match hash_file_with(path, recorded.algorithm, options) {
        Ok(actual) if actual.matches(recorded) => Evaluation::Verified,
        Ok(actual) => Evaluation::Modified { actual },
        Err(CustodyError::FileNotFound { .. }) => Evaluation::Missing,
        Err(CustodyError::Cancelled) => Evaluation::Interrupted,
        Err(e) => Evaluation::ReadError(e.to_string()),
    }
}

/// A problem found for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub item_id: u64,
    pub reason: IssueReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueReason {
    Missing { path: PathBuf },
    Modified { expected: String, actual: String },
    ReadError { message: String },
}

impl fmt::Display for IssueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueReason::Missing { path } => write!(f, "File missing: {}", path.display()),
            IssueReason::Modified { expected, actual } => {
                write!(f, "Hash mismatch: expected {}, got {}", expected, actual)
            }
            IssueReason::ReadError { message } => write!(f, "Read error: {}", message),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {}: {}", self.item_id, self.reason)
    }
}

/// Outcome of a verification pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// Every item reached `verified` and nothing was left undecided
    pub all_passed: bool,
    /// Ordered by item id
    pub issues: Vec<Issue>,
    /// Items left untouched because the pass was cancelled
    pub undecided: Vec<u64>,
    pub cancelled: bool,
    pub checked: usize,
    pub verified: usize,
    pub missing: usize,
    pub modified: usize,
}

impl VerificationOutcome {
    /// Number of items whose status this pass decided
    pub fn decided(&self) -> usize {
        self.verified + self.missing + self.modified
    }

    /// One-line summary suitable for a custody entry. Unreadable items are
    /// part of the modified count and are also called out on their own.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} items checked: {} verified, {} missing, {} modified",
            self.decided(),
            self.verified,
            self.missing,
            self.modified
        );
        let read_errors = self
            .issues
            .iter()
            .filter(|i| matches!(i.reason, IssueReason::ReadError { .. }))
            .count();
        if read_errors > 0 {
            summary.push_str(&format!(", {} unreadable", read_errors));
        }
        if !self.undecided.is_empty() {
            summary.push_str(&format!(", {} not reached", self.undecided.len()));
        }
        summary
    }
}

struct Target {
    id: u64,
    path: PathBuf,
    recorded: ContentHash,
}

/// Re-verify every item in `catalog` and write back decided statuses.
///
/// Items that could not be read are marked modified and reported with a
/// read-error reason. If the pass is cancelled, items already decided keep
/// their new status and the rest are listed in `undecided`.
pub fn verify_all(
    catalog: &mut EvidenceCatalog,
    options: &VerifyOptions,
    progress: Option<&(dyn Fn(VerifyProgress) + Sync)>,
) -> VerificationOutcome {
    let targets: Vec<Target> = catalog
        .items()
        .iter()
        .map(|item| Target {
            id: item.id,
            path: item.absolute_path.clone(),
            recorded: item.hash.clone(),
        })
        .collect();
    let total = targets.len();

    let token = options.token();
    let hash_options = HashOptions {
        chunk_size: options.chunk_size,
        cancel: token.clone(),
    };
    let completed = AtomicUsize::new(0);

    let run = |target: &Target| -> (u64, Evaluation) {
        let evaluation = match &token {
            Some(token) if token.is_cancelled() => Evaluation::Interrupted,
            _ => evaluate(&target.recorded, &target.path, &hash_options),
        };
        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(report) = progress {
            report(VerifyProgress {
                completed: done,
                total,
            });
        }
        (target.id, evaluation)
    };

    let workers = if options.workers == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        options.workers
    };

    let mut results: Vec<(u64, Evaluation)> =
        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(|| targets.par_iter().map(run).collect()),
            Err(e) => {
                tracing::warn!("Worker pool unavailable ({}), verifying sequentially", e);
                targets.iter().map(run).collect()
            }
        };
    results.sort_by_key(|(id, _)| *id);

    let mut outcome = VerificationOutcome {
        all_passed: false,
        issues: Vec::new(),
        undecided: Vec::new(),
        cancelled: false,
        checked: total,
        verified: 0,
        missing: 0,
        modified: 0,
    };

    for (target, (id, evaluation)) in targets.iter().zip(results) {
        debug_assert_eq!(target.id, id);
        if let Some(status) = evaluation.status() {
            catalog.set_status(id, status);
        }
        match evaluation {
            Evaluation::Verified => outcome.verified += 1,
            Evaluation::Missing => {
                outcome.missing += 1;
                tracing::warn!("Item {} missing: {}", id, target.path.display());
                outcome.issues.push(Issue {
                    item_id: id,
                    reason: IssueReason::Missing {
                        path: target.path.clone(),
                    },
                });
            }
            Evaluation::Modified { actual } => {
                outcome.modified += 1;
                tracing::warn!("Item {} modified: {}", id, target.path.display());
                outcome.issues.push(Issue {
                    item_id: id,
                    reason: IssueReason::Modified {
                        expected: target.recorded.digest.clone(),
                        actual: actual.digest,
                    },
                });
            }
            Evaluation::ReadError(message) => {
                outcome.modified += 1;
                tracing::warn!("Item {} unreadable: {}", id, message);
                outcome.issues.push(Issue {
                    item_id: id,
                    reason: IssueReason::ReadError { message },
                });
            }
            Evaluation::Interrupted => outcome.undecided.push(id),
        }
    }

    outcome.cancelled = !outcome.undecided.is_empty();
    outcome.all_passed = outcome.issues.is_empty() && !outcome.cancelled;

    if outcome.cancelled {
        tracing::warn!("Verification interrupted: {}", outcome.summary());
    } else if outcome.all_passed {
        tracing::info!("All {} evidence items verified", total);
    } else {
        tracing::warn!("Found {} integrity issues", outcome.issues.len());
    }

    outcome
}
