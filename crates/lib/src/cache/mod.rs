//! Local manifest cache.
//!
//! The last successfully fetched manifest is kept on disk so a check within the freshness
//! window skips the network, and an offline check can still plan against stale data.
//!
//! # Cache File Format
//!
//! ```json
//! {
//!   "version": "1.0.0",
//!   "digestKind": "content",
//!   "files": [
//!     { "name": "a.dll", "size": 3, "hash": "ab12...", "url": "/files/a.dll" }
//!   ],
//!   "lastUpdated": "2024-05-01T12:00:00Z"
//! }
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::manifest::{FileRecord, Manifest, ManifestEntry};
use crate::util::hash::DigestKind;

/// A persisted manifest snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
  pub version: Option<String>,
  pub digest_kind: DigestKind,
  pub entries: Vec<ManifestEntry>,
  pub last_updated: DateTime<Utc>,
}

impl CacheRecord {
  /// Snapshot a freshly fetched manifest.
  pub fn from_manifest(manifest: &Manifest, now: DateTime<Utc>) -> Self {
    Self {
      version: manifest.version().map(str::to_string),
      digest_kind: manifest.digest_kind(),
      entries: manifest.entries().to_vec(),
      last_updated: now,
    }
  }

  /// Rebuild the manifest this record was taken from.
  pub fn to_manifest(&self) -> Result<Manifest, CacheError> {
    Manifest::new(
      self.version.clone(),
      self.digest_kind,
      self.entries.clone(),
      self.last_updated,
    )
    .map_err(|e| CacheError::Invalid(e.to_string()))
  }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
  #[serde(default)]
  version: Option<String>,
  #[serde(default)]
  digest_kind: DigestKind,
  #[serde(default)]
  files: Vec<FileRecord>,
  last_updated: DateTime<Utc>,
}

/// Errors that can occur when working with the cache file.
#[derive(Debug, Error)]
pub enum CacheError {
  /// No cache file exists.
  #[error("no cache file at {}", .0.display())]
  NotFound(PathBuf),

  /// Failed to read the cache file.
  #[error("failed to read cache file: {0}")]
  Read(#[source] io::Error),

  /// Failed to parse the cache file JSON.
  #[error("failed to parse cache file: {0}")]
  Decode(#[source] serde_json::Error),

  /// The cache file parsed but holds an unusable manifest.
  #[error("cache file holds an invalid manifest: {0}")]
  Invalid(String),

  /// Failed to write the cache file.
  #[error("failed to write cache file: {0}")]
  Write(#[source] io::Error),

  /// Failed to serialize the cache record.
  #[error("failed to serialize cache file: {0}")]
  Serialize(#[source] serde_json::Error),
}

/// The sole reader and writer of the cache file.
#[derive(Debug, Clone)]
pub struct CacheStore {
  path: PathBuf,
}

impl CacheStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Load the cache record.
  pub fn load(&self) -> Result<CacheRecord, CacheError> {
    let content = match fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(CacheError::NotFound(self.path.clone())),
      Err(e) => return Err(CacheError::Read(e)),
    };

    let file: CacheFile = serde_json::from_str(&content).map_err(CacheError::Decode)?;
    let kind = file.digest_kind;

    Ok(CacheRecord {
      version: file.version,
      digest_kind: kind,
      entries: file.files.into_iter().map(|r| r.into_entry(kind)).collect(),
      last_updated: file.last_updated,
    })
  }

  /// Replace the cache file with `record`.
  ///
  /// The stored timestamp never moves backwards: when the existing file is newer than
  /// `record.last_updated`, the existing timestamp is kept. Returns the timestamp written.
  /// Uses atomic write (write to temp, then rename).
  pub fn save(&self, record: &CacheRecord) -> Result<DateTime<Utc>, CacheError> {
    let last_updated = match self.load() {
      Ok(previous) if previous.last_updated > record.last_updated => {
        debug!(
          previous = %previous.last_updated,
          requested = %record.last_updated,
          "clamping cache timestamp"
        );
        previous.last_updated
      }
      _ => record.last_updated,
    };

    let file = CacheFile {
      version: record.version.clone(),
      digest_kind: record.digest_kind,
      files: record.entries.iter().map(FileRecord::from_entry).collect(),
      last_updated,
    };
    let content = serde_json::to_string_pretty(&file).map_err(CacheError::Serialize)?;

    let dir = match self.path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(CacheError::Write)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(CacheError::Write)?;
    temp.write_all(content.as_bytes()).map_err(CacheError::Write)?;
    temp.persist(&self.path).map_err(|e| CacheError::Write(e.error))?;

    debug!(path = %self.path.display(), files = file.files.len(), "cache saved");
    Ok(last_updated)
  }

  /// Delete the cache file. A missing file is not an error.
  pub fn invalidate(&self) -> Result<(), CacheError> {
    match fs::remove_file(&self.path) {
      Ok(()) => {
        debug!(path = %self.path.display(), "cache invalidated");
        Ok(())
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(CacheError::Write(e)),
    }
  }
}

/// Whether `record` is younger than `window` at `now`.
///
/// The boundary is exclusive: a record exactly `window` old is stale. A timestamp in the future
/// counts as fresh.
pub fn is_fresh(record: &CacheRecord, now: DateTime<Utc>, window: Duration) -> bool {
  let age = now.signed_duration_since(record.last_updated);
  match age.to_std() {
    Ok(age) => age < window,
    Err(_) => true,
  }
}
