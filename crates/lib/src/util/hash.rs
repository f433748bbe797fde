//! Digest computation for local files.
//!
//! Digest spaces never compare equal to each other:
//! - `ContentHash`: a 32-character MD5 of the raw file bytes, the update backend's `hash` field
//! - `Sha256Hash`: a 64-character SHA-256 of the raw file bytes, for backends configured to
//!   publish it
//! - `BlobHash`: a 40-character git blob id (SHA-1 over `blob <len>\0` + bytes), served by
//!   source-hosting content listings
//!
//! `FileDigest` carries the space alongside the hex string so a manifest digest is always
//! compared against a local digest computed the same way.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// An MD5 hash of file content.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (32 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A full SHA-256 hash of file content.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256Hash(pub String);

impl std::fmt::Display for Sha256Hash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A git blob object id.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (40 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobHash(pub String);

impl std::fmt::Display for BlobHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Which digest space a manifest uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestKind {
  /// MD5 of the raw bytes.
  #[default]
  #[serde(alias = "md5")]
  Content,
  Sha256,
  Blob,
}

impl std::fmt::Display for DigestKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DigestKind::Content => write!(f, "content"),
      DigestKind::Sha256 => write!(f, "sha256"),
      DigestKind::Blob => write!(f, "blob"),
    }
  }
}

/// A digest tagged with its space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileDigest {
  Content(ContentHash),
  Sha256(Sha256Hash),
  Blob(BlobHash),
}

impl FileDigest {
  /// Build a digest of the given kind from a hex string as served by a remote.
  ///
  /// Hex is normalized to lowercase; an optional `md5:` / `sha256:` / `sha1:` prefix is dropped.
  pub fn parse(kind: DigestKind, value: &str) -> Self {
    let normalized = value
      .trim()
      .trim_start_matches("md5:")
      .trim_start_matches("sha256:")
      .trim_start_matches("sha1:")
      .to_ascii_lowercase();
    match kind {
      DigestKind::Content => FileDigest::Content(ContentHash(normalized)),
      DigestKind::Sha256 => FileDigest::Sha256(Sha256Hash(normalized)),
      DigestKind::Blob => FileDigest::Blob(BlobHash(normalized)),
    }
  }

  pub fn kind(&self) -> DigestKind {
    match self {
      FileDigest::Content(_) => DigestKind::Content,
      FileDigest::Sha256(_) => DigestKind::Sha256,
      FileDigest::Blob(_) => DigestKind::Blob,
    }
  }

  /// The hex string, without the space tag.
  pub fn as_hex(&self) -> &str {
    match self {
      FileDigest::Content(h) => &h.0,
      FileDigest::Sha256(h) => &h.0,
      FileDigest::Blob(h) => &h.0,
    }
  }
}

impl std::fmt::Display for FileDigest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.kind(), self.as_hex())
  }
}

/// Error while reading a file for hashing.
#[derive(Debug, thiserror::Error)]
#[error("failed to read file {path}: {source}")]
pub struct DigestError {
  pub path: String,
  #[source]
  pub source: std::io::Error,
}

impl DigestError {
  fn new(path: &Path, source: std::io::Error) -> Self {
    Self {
      path: path.display().to_string(),
      source,
    }
  }
}

/// Compute the digest of a local file in the requested space.
pub fn digest_of(path: &Path, kind: DigestKind) -> Result<FileDigest, DigestError> {
  match kind {
    DigestKind::Content => hash_file(path).map(FileDigest::Content),
    DigestKind::Sha256 => sha256_file(path).map(FileDigest::Sha256),
    DigestKind::Blob => blob_hash_file(path).map(FileDigest::Blob),
  }
}

/// Hash a file's contents.
///
/// Returns the 32-character MD5 hash the update backend publishes.
pub fn hash_file(path: &Path) -> Result<ContentHash, DigestError> {
  let mut file = fs::File::open(path).map_err(|e| DigestError::new(path, e))?;
  let mut hasher = Md5::new();
  stream_into(&mut file, path, |chunk| hasher.update(chunk))?;
  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Returns the full 64-character SHA256 hash of the file.
pub fn sha256_file(path: &Path) -> Result<Sha256Hash, DigestError> {
  let mut file = fs::File::open(path).map_err(|e| DigestError::new(path, e))?;
  let mut hasher = Sha256::new();
  stream_into(&mut file, path, |chunk| hasher.update(chunk))?;
  Ok(Sha256Hash(hex::encode(hasher.finalize())))
}

/// Compute the git blob id of a file.
///
/// The header needs the length up front, so it comes from the file metadata.
pub fn blob_hash_file(path: &Path) -> Result<BlobHash, DigestError> {
  let mut file = fs::File::open(path).map_err(|e| DigestError::new(path, e))?;
  let len = file.metadata().map_err(|e| DigestError::new(path, e))?.len();

  let mut hasher = Sha1::new();
  hasher.update(format!("blob {}\0", len).as_bytes());
  stream_into(&mut file, path, |chunk| hasher.update(chunk))?;
  Ok(BlobHash(format!("{:x}", hasher.finalize())))
}

/// MD5 of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Md5::digest(data)))
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA256 hash.
pub fn sha256_bytes(data: &[u8]) -> Sha256Hash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  Sha256Hash(hex::encode(hasher.finalize()))
}

/// Git blob id of arbitrary bytes.
pub fn blob_hash_bytes(data: &[u8]) -> BlobHash {
  let mut hasher = Sha1::new();
  hasher.update(format!("blob {}\0", data.len()).as_bytes());
  hasher.update(data);
  BlobHash(hex::encode(hasher.finalize()))
}

fn stream_into(file: &mut fs::File, path: &Path, mut update: impl FnMut(&[u8])) -> Result<(), DigestError> {
  let mut buffer = [0u8; 8192];
  loop {
    let bytes_read = file.read(&mut buffer).map_err(|e| DigestError::new(path, e))?;
    if bytes_read == 0 {
      break;
    }
    update(&buffer[..bytes_read]);
  }
  Ok(())
}
