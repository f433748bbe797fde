//! Manifest types.

use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::{FetchError, RateLimitQuota};
use crate::util::hash::{DigestKind, FileDigest};

/// One distributable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
  /// Path relative to the install root.
  pub name: String,
  /// Declared size in bytes.
  pub size: u64,
  /// Declared digest, in the manifest's digest space.
  pub digest: FileDigest,
  /// Where the file is served from, as declared by the source (may be relative to the backend).
  pub source_url: String,
}

/// Server-declared description of the expected file set.
///
/// Fields are private: a manifest is validated once on construction and never changes
/// afterwards. A newer fetch produces a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
  version: Option<String>,
  digest_kind: DigestKind,
  entries: Vec<ManifestEntry>,
  fetched_at: DateTime<Utc>,
}

impl Manifest {
  /// Validate and build a manifest.
  ///
  /// Every entry must carry a digest of `digest_kind` and a safe relative name.
  pub fn new(
    version: Option<String>,
    digest_kind: DigestKind,
    entries: Vec<ManifestEntry>,
    fetched_at: DateTime<Utc>,
  ) -> Result<Self, ManifestError> {
    for entry in &entries {
      validate_entry_name(&entry.name)?;
      if entry.digest.kind() != digest_kind {
        return Err(ManifestError::Invalid(format!(
          "entry '{}' has a {} digest in a {} manifest",
          entry.name,
          entry.digest.kind(),
          digest_kind
        )));
      }
    }

    Ok(Self {
      version: version.filter(|v| !v.trim().is_empty()),
      digest_kind,
      entries,
      fetched_at,
    })
  }

  /// The version the source declares, if any.
  pub fn version(&self) -> Option<&str> {
    self.version.as_deref()
  }

  pub fn digest_kind(&self) -> DigestKind {
    self.digest_kind
  }

  pub fn entries(&self) -> &[ManifestEntry] {
    &self.entries
  }

  pub fn fetched_at(&self) -> DateTime<Utc> {
    self.fetched_at
  }

  /// Total declared size of all entries.
  pub fn total_size(&self) -> u64 {
    self.entries.iter().map(|e| e.size).sum()
  }
}

/// Reject names that would escape the install root.
fn validate_entry_name(name: &str) -> Result<(), ManifestError> {
  if name.trim().is_empty() {
    return Err(ManifestError::Invalid("entry with empty name".to_string()));
  }
  let safe = Path::new(name).components().all(|c| matches!(c, Component::Normal(_)));
  if !safe {
    return Err(ManifestError::Invalid(format!(
      "entry name '{}' is not a plain relative path",
      name
    )));
  }
  Ok(())
}

/// A file as it appears on the wire, in backend responses and in the cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
  pub name: String,
  #[serde(default)]
  pub size: u64,
  pub hash: String,
  #[serde(default)]
  pub url: String,
}

impl FileRecord {
  pub fn from_entry(entry: &ManifestEntry) -> Self {
    Self {
      name: entry.name.clone(),
      size: entry.size,
      hash: entry.digest.as_hex().to_string(),
      url: entry.source_url.clone(),
    }
  }

  pub fn into_entry(self, kind: DigestKind) -> ManifestEntry {
    ManifestEntry {
      digest: FileDigest::parse(kind, &self.hash),
      name: self.name,
      size: self.size,
      source_url: self.url,
    }
  }
}

/// Response of the version probe (`GET /api/version`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
  pub current: String,
  #[serde(default)]
  pub versions: Vec<VersionEntry>,
}

impl VersionInfo {
  /// The release notes entry for the current version.
  pub fn current_entry(&self) -> Option<&VersionEntry> {
    self.versions.iter().find(|v| v.version == self.current)
  }
}

/// One released version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
  pub version: String,
  #[serde(default)]
  pub release_date: String,
  #[serde(default)]
  pub notes: String,
}

/// Errors that can occur while fetching a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  /// The remote refused the request for quota reasons.
  #[error("rate limited while fetching {url} ({quota})")]
  RateLimited { url: String, quota: RateLimitQuota },

  /// The remote was unreachable or answered with an error status.
  #[error("failed to fetch manifest: {0}")]
  Network(#[source] FetchError),

  /// The response was not a valid manifest payload.
  #[error("failed to decode response from {url}: {source}")]
  Decode {
    url: String,
    #[source]
    source: serde_json::Error,
  },

  /// The payload decoded but describes an unusable manifest.
  #[error("invalid manifest: {0}")]
  Invalid(String),

  /// The operation has no equivalent for the configured source.
  #[error("{operation} is not supported by the {source_kind} source")]
  Unsupported {
    operation: &'static str,
    source_kind: &'static str,
  },
}

impl ManifestError {
  /// Quota metadata, when the failure was a rate limit.
  pub fn quota(&self) -> Option<&RateLimitQuota> {
    match self {
      ManifestError::RateLimited { quota, .. } => Some(quota),
      _ => None,
    }
  }
}

impl From<FetchError> for ManifestError {
  fn from(err: FetchError) -> Self {
    match err {
      FetchError::RateLimited { url, quota } => ManifestError::RateLimited { url, quota },
      other => ManifestError::Network(other),
    }
  }
}
