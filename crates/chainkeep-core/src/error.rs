//! Error taxonomy for custody operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the custody core.
///
/// Per-item failures inside a scan or verification pass are collected into
/// the pass outcome instead of being returned through this type; only
/// operation-level failures reach the caller as `Err`.
#[derive(Debug, Error)]
pub enum CustodyError {
    /// Intake target does not exist
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Read or hash failure on a specific file
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Requested hash algorithm is not supported
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Case snapshot does not exist
    #[error("case snapshot not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Case snapshot exists but cannot be trusted
    #[error("corrupt case snapshot {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Case id cannot be used as a snapshot key
    #[error("invalid case id: {0:?}")]
    InvalidCaseId(String),

    /// A snapshot already exists for this case id
    #[error("case {case_id} already exists at {}", path.display())]
    CaseExists { case_id: String, path: PathBuf },

    #[error("no evidence item with id {0}")]
    UnknownItem(u64),

    /// Operation interrupted by cancellation or deadline
    #[error("operation cancelled")]
    Cancelled,
}

impl CustodyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CustodyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_path() {
        let err = CustodyError::FileNotFound {
            path: PathBuf::from("/evidence/disk.dd"),
        };
        assert_eq!(err.to_string(), "file not found: /evidence/disk.dd");

        let err = CustodyError::Corrupt {
            path: PathBuf::from("CASE-1.custody.json"),
            reason: "ledger id gap".to_string(),
        };
        assert!(err.to_string().contains("ledger id gap"));
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error as _;

        let err = CustodyError::io("a.bin", io::Error::new(io::ErrorKind::Other, "bad sector"));
        assert!(err.source().is_some());
    }
}
