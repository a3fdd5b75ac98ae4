//! Hashing utilities for content-addressed vertices and workspace files.
//!
//! This module provides:
//! - `Digest`: a `sha256:`-prefixed identity for serialized vertices
//! - `Hashable`: canonical-JSON digests for any serializable value
//! - `hash_file()`: single file hashing
//! - `hash_bytes()`: arbitrary byte hashing

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::consts::DIGEST_ALGORITHM;

pub type HashError = serde_json::Error;

/// A content-addressed digest identifying a unique vertex.
///
/// # Format
///
/// The algorithm name, a colon, and the lowercase hexadecimal SHA-256, e.g.
/// `"sha256:9f86d081884c7d65..."`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(pub String);

impl Digest {
  /// Build a digest from raw bytes.
  pub fn of_bytes(data: &[u8]) -> Self {
    Digest(format!("{}:{}", DIGEST_ALGORITHM, hash_bytes(data).0))
  }

  /// The hex part of the digest, without the algorithm prefix.
  pub fn hex(&self) -> &str {
    self
      .0
      .split_once(':')
      .map(|(_, hex)| hex)
      .unwrap_or(&self.0)
  }

  /// A short form for human-readable output.
  pub fn short(&self) -> &str {
    let hex = self.hex();
    &hex[..hex.len().min(12)]
  }
}

impl std::fmt::Display for Digest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  /// Digest of the compact JSON encoding of `self`.
  ///
  /// Struct fields serialize in declaration order and maps are `BTreeMap`s,
  /// so equal values always produce equal digests.
  fn compute_digest(&self) -> Result<Digest, HashError> {
    let serialized = serde_json::to_vec(self)?;
    Ok(Digest::of_bytes(&serialized))
  }
}

/// A full 64-character SHA256 hash for content verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error while hashing a file.
#[derive(Debug, thiserror::Error)]
pub enum FileHashError {
  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },
}

/// Hash a file's contents.
///
/// Returns the full 64-character SHA256 hash of the file.
pub fn hash_file(path: &Path) -> Result<ContentHash, FileHashError> {
  let mut file = fs::File::open(path).map_err(|e| FileHashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  })?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(|e| FileHashError::ReadFile {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA256 hash.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}
