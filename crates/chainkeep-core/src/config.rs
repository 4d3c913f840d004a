//! Runtime configuration for custody operations

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CustodyError, Result};
use crate::forensics::{sidecar_suffixes, HashAlgorithm, DEFAULT_CHUNK_SIZE};

/// Configuration shared by intake and verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    /// Algorithm used to hash evidence at intake
    pub acquisition_algorithm: HashAlgorithm,

    /// Streaming read size in bytes
    pub chunk_size: usize,

    /// Verification worker threads; zero means available parallelism
    pub verify_workers: usize,

    /// Suffixes skipped during directory scans, in addition to sidecars
    pub extra_excluded_suffixes: Vec<String>,

    /// Upper bound on a whole verification pass, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_timeout_secs: Option<u64>,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            acquisition_algorithm: HashAlgorithm::MD5,
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify_workers: 0,
            extra_excluded_suffixes: Vec::new(),
            verify_timeout_secs: None,
        }
    }
}

impl CustodyConfig {
    /// SHA-256 at intake, for cases where MD5 collisions matter
    pub fn strong() -> Self {
        Self {
            acquisition_algorithm: HashAlgorithm::SHA256,
            ..Default::default()
        }
    }

    /// Read a JSON config file; absent fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| CustodyError::io(path, e))?;
        serde_json::from_str(&json).map_err(|e| CustodyError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Sidecar suffixes plus any configured extras
    pub fn excluded_suffixes(&self) -> Vec<String> {
        let mut suffixes = sidecar_suffixes();
        suffixes.extend(self.extra_excluded_suffixes.iter().cloned());
        suffixes
    }

    pub fn workers(&self) -> usize {
        if self.verify_workers > 0 {
            return self.verify_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn verify_timeout(&self) -> Option<Duration> {
        self.verify_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("chainkeep.json");
        std::fs::write(&path, r#"{"acquisition_algorithm": "sha512", "verify_workers": 3}"#)
            .unwrap();

        let config = CustodyConfig::load(&path).unwrap();
        assert_eq!(config.acquisition_algorithm, HashAlgorithm::SHA512);
        assert_eq!(config.workers(), 3);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.verify_timeout().is_none());
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("chainkeep.json");
        std::fs::write(&path, r#"{"acquisition_algorithm": "crc32"}"#).unwrap();

        assert!(matches!(
            CustodyConfig::load(&path),
            Err(CustodyError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_excluded_suffixes_include_extras() {
        let config = CustodyConfig {
            extra_excluded_suffixes: vec![".tmp".to_string()],
            ..CustodyConfig::strong()
        };
        let suffixes = config.excluded_suffixes();
        assert!(suffixes.contains(&".tmp".to_string()));
        assert!(suffixes.contains(&".custody.json".to_string()));
        assert!(config.workers() >= 1);
    }
}
