/// Streaming content hashing for evidence integrity
///
/// Files are folded into the digest one fixed-size chunk at a time, so
/// arbitrarily large disk or memory images never have to fit in memory.
/// The chunk size is a throughput knob only: identical bytes always yield
/// identical digests.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::str::FromStr;

use crate::cancel::CancelToken;
use crate::error::{CustodyError, Result};
use crate::ContentHash;

/// Default read size for streaming hashes
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    MD5,
    SHA1,
    SHA256,
    SHA512,
}

impl HashAlgorithm {
    /// Get all algorithms, in sidecar lookup order
    pub fn all() -> Vec<Self> {
        vec![Self::MD5, Self::SHA1, Self::SHA256, Self::SHA512]
    }

    /// Get algorithm name
    pub fn name(&self) -> &'static str {
        match self {
            Self::MD5 => "MD5",
            Self::SHA1 => "SHA1",
            Self::SHA256 => "SHA256",
            Self::SHA512 => "SHA512",
        }
    }

    /// Extension used by hash sidecar files (`disk.dd.sha256`)
    pub fn extension(&self) -> &'static str {
        match self {
            Self::MD5 => "md5",
            Self::SHA1 => "sha1",
            Self::SHA256 => "sha256",
            Self::SHA512 => "sha512",
        }
    }

    /// Length of the hex digest
    pub fn hex_len(&self) -> usize {
        match self {
            Self::MD5 => 32,
            Self::SHA1 => 40,
            Self::SHA256 => 64,
            Self::SHA512 => 128,
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::MD5
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "");
        match normalized.as_str() {
            "md5" => Ok(Self::MD5),
            "sha1" => Ok(Self::SHA1),
            "sha256" => Ok(Self::SHA256),
            "sha512" => Ok(Self::SHA512),
            _ => Err(CustodyError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Tuning for a single streaming hash
#[derive(Debug, Clone, Default)]
pub struct HashOptions {
    /// Bytes per read; zero falls back to [`DEFAULT_CHUNK_SIZE`]
    pub chunk_size: usize,

    /// Polled between chunks
    pub cancel: Option<CancelToken>,
}

enum StreamHasher {
    Md5(md5::Context),
    Sha1(sha1::Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl StreamHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::MD5 => Self::Md5(md5::Context::new()),
            HashAlgorithm::SHA1 => Self::Sha1(sha1::Sha1::new()),
            HashAlgorithm::SHA256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::SHA512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(data),
            Self::Sha1(hasher) => hasher.update(data),
            Self::Sha256(hasher) => hasher.update(data),
            Self::Sha512(hasher) => hasher.update(data),
        }
    }

    fn finish(self) -> String {
        match self {
            Self::Md5(ctx) => format!("{:x}", ctx.compute()),
            Self::Sha1(hasher) => format!("{:x}", hasher.finalize()),
            Self::Sha256(hasher) => format!("{:x}", hasher.finalize()),
            Self::Sha512(hasher) => format!("{:x}", hasher.finalize()),
        }
    }
}

/// Hash a file with the default chunk size
pub fn hash_file(path: impl AsRef<Path>, algorithm: HashAlgorithm) -> Result<ContentHash> {
    hash_file_with(path, algorithm, &HashOptions::default())
}

/// Hash a file, streaming it in `options.chunk_size` reads.
///
/// A read error or cancellation part way through discards the partial
/// state; no digest is ever produced for a file that was not read to EOF.
pub fn hash_file_with(
    path: impl AsRef<Path>,
    algorithm: HashAlgorithm,
    options: &HashOptions,
) -> Result<ContentHash> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CustodyError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => CustodyError::io(path, e),
    })?;

    let chunk_size = if options.chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        options.chunk_size
    };

    let mut hasher = StreamHasher::new(algorithm);
    let mut buffer = vec![0; chunk_size];
    loop {
        if let Some(cancel) = &options.cancel {
            if cancel.is_cancelled() {
                return Err(CustodyError::Cancelled);
            }
        }
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CustodyError::io(path, e)),
        };
        hasher.update(&buffer[..n]);
    }

    Ok(ContentHash {
        algorithm,
        digest: hasher.finish(),
    })
}

/// Calculate hash from byte slice
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = StreamHasher::new(algorithm);
    hasher.update(data);
    hasher.finish()
}
