//! Manifest client for the backend and repository sources.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::types::{FileRecord, Manifest, ManifestEntry, ManifestError, VersionInfo};
use crate::consts::{DEFAULT_BRANCH, DEFAULT_REPOSITORY_API_URL, DEFAULT_REPOSITORY_RAW_URL, DEFAULT_REPOSITORY_RELEASE_URL};
use crate::transport::{HttpTransport, get_bytes};
use crate::util::hash::{DigestKind, FileDigest};

/// Where manifests come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
  /// A generic update backend (`/api/files`, `/api/version`, `/api/latest`).
  Backend {
    base_url: String,
    /// Base URL used for files once the backend starts rate limiting.
    fallback_url: Option<String>,
    /// Space of the `hash` field; MD5 unless the backend is configured otherwise.
    digest: DigestKind,
  },
  /// A directory listing of a source-hosting repository.
  Repository(RepositorySource),
}

/// Coordinates of a repository directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySource {
  pub owner: String,
  pub repo: String,
  pub branch: String,
  /// Directory inside the repository; empty for the root.
  pub path: String,
  pub api_url: String,
  pub raw_url: String,
  pub release_url: String,
  /// Release asset installed by the bulk installer.
  pub package_asset: Option<String>,
}

impl RepositorySource {
  pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
    Self {
      owner: owner.into(),
      repo: repo.into(),
      branch: DEFAULT_BRANCH.to_string(),
      path: String::new(),
      api_url: DEFAULT_REPOSITORY_API_URL.to_string(),
      raw_url: DEFAULT_REPOSITORY_RAW_URL.to_string(),
      release_url: DEFAULT_REPOSITORY_RELEASE_URL.to_string(),
      package_asset: None,
    }
  }

  fn dir(&self) -> &str {
    self.path.trim_matches('/')
  }

  /// Path of `name` from the repository root.
  fn repo_path(&self, name: &str) -> String {
    match self.dir() {
      "" => name.to_string(),
      dir => format!("{}/{}", dir, name),
    }
  }
}

impl ManifestSource {
  pub fn backend(base_url: impl Into<String>) -> Self {
    ManifestSource::Backend {
      base_url: base_url.into(),
      fallback_url: None,
      digest: DigestKind::Content,
    }
  }

  /// Short name used in logs and errors.
  pub fn kind_name(&self) -> &'static str {
    match self {
      ManifestSource::Backend { .. } => "backend",
      ManifestSource::Repository(_) => "repository",
    }
  }

  /// The digest space entries from this source are declared in.
  pub fn digest_kind(&self) -> DigestKind {
    match self {
      ManifestSource::Backend { digest, .. } => *digest,
      ManifestSource::Repository(_) => DigestKind::Blob,
    }
  }

  /// URL of the manifest listing.
  pub fn manifest_url(&self) -> String {
    match self {
      ManifestSource::Backend { base_url, .. } => join_url(base_url, "api/files"),
      ManifestSource::Repository(repo) => format!(
        "{}/repos/{}/{}/contents/{}?ref={}",
        repo.api_url.trim_end_matches('/'),
        repo.owner,
        repo.repo,
        repo.dir(),
        repo.branch
      ),
    }
  }

  /// Primary download URL for an entry. Relative URLs resolve against the backend base.
  pub fn entry_url(&self, entry: &ManifestEntry) -> String {
    if is_absolute(&entry.source_url) {
      return entry.source_url.clone();
    }
    match self {
      ManifestSource::Backend { base_url, .. } => join_url(base_url, &entry.source_url),
      ManifestSource::Repository(_) if entry.source_url.is_empty() => self
        .raw_url(&entry.name)
        .unwrap_or_default(),
      ManifestSource::Repository(repo) => join_url(&repo.raw_url, &entry.source_url),
    }
  }

  /// Alternate URL for `name` used after a rate limit, if this source has one.
  pub fn raw_url(&self, name: &str) -> Option<String> {
    match self {
      ManifestSource::Backend { fallback_url, .. } => fallback_url.as_deref().map(|base| join_url(base, name)),
      ManifestSource::Repository(repo) => Some(format!(
        "{}/{}/{}/{}/{}",
        repo.raw_url.trim_end_matches('/'),
        repo.owner,
        repo.repo,
        repo.branch,
        repo.repo_path(name)
      )),
    }
  }

  /// URL of the whole-application package, if this source publishes one.
  pub fn package_url(&self) -> Option<String> {
    match self {
      ManifestSource::Backend { base_url, .. } => Some(join_url(base_url, "api/latest")),
      ManifestSource::Repository(repo) => repo.package_asset.as_ref().map(|asset| {
        format!(
          "{}/{}/{}/releases/latest/download/{}",
          repo.release_url.trim_end_matches('/'),
          repo.owner,
          repo.repo,
          asset
        )
      }),
    }
  }
}

fn is_absolute(url: &str) -> bool {
  url.starts_with("http://") || url.starts_with("https://")
}

fn join_url(base: &str, path: &str) -> String {
  format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[derive(Debug, Deserialize)]
struct FilesResponse {
  #[serde(default)]
  version: Option<String>,
  #[serde(default)]
  files: Vec<FileRecord>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
  path: String,
  sha: String,
  #[serde(default)]
  size: u64,
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  download_url: Option<String>,
}

/// Fetches manifests and version information from a [`ManifestSource`].
#[derive(Debug)]
pub struct ManifestClient<T> {
  transport: Arc<T>,
  source: ManifestSource,
}

impl<T: HttpTransport> ManifestClient<T> {
  pub fn new(transport: Arc<T>, source: ManifestSource) -> Self {
    Self { transport, source }
  }

  pub fn source(&self) -> &ManifestSource {
    &self.source
  }

  pub fn transport(&self) -> &Arc<T> {
    &self.transport
  }

  /// Retrieve the current manifest.
  ///
  /// A rate-limited response surfaces as [`ManifestError::RateLimited`] with the quota the
  /// remote reported; every other transport failure is [`ManifestError::Network`].
  pub async fn fetch_manifest(&self) -> Result<Manifest, ManifestError> {
    let url = self.source.manifest_url();
    info!(source = self.source.kind_name(), url = %url, "fetching manifest");

    let manifest = match &self.source {
      ManifestSource::Backend { digest, .. } => {
        let response: FilesResponse = self.get_json(&url).await?;
        let entries = response
          .files
          .into_iter()
          .map(|record| record.into_entry(*digest))
          .collect::<Vec<_>>();
        if let Some(entry) = entries.iter().find(|e| e.source_url.is_empty()) {
          return Err(ManifestError::Invalid(format!("entry '{}' has no url", entry.name)));
        }
        Manifest::new(response.version, *digest, entries, Utc::now())?
      }
      ManifestSource::Repository(repo) => {
        let items: Vec<ContentItem> = self.get_json(&url).await?;
        let prefix = match repo.dir() {
          "" => String::new(),
          dir => format!("{}/", dir),
        };

        let mut entries = Vec::new();
        for item in items {
          if item.kind != "file" {
            debug!(path = %item.path, kind = %item.kind, "skipping non-file listing item");
            continue;
          }
          let name = item.path.strip_prefix(&prefix).unwrap_or(&item.path).to_string();
          entries.push(ManifestEntry {
            source_url: item.download_url.unwrap_or_default(),
            digest: FileDigest::parse(DigestKind::Blob, &item.sha),
            size: item.size,
            name,
          });
        }
        Manifest::new(None, DigestKind::Blob, entries, Utc::now())?
      }
    };

    info!(
      version = manifest.version().unwrap_or("-"),
      files = manifest.entries().len(),
      "manifest fetched"
    );
    Ok(manifest)
  }

  /// Probe the backend for its current version and release notes.
  pub async fn fetch_version_info(&self) -> Result<VersionInfo, ManifestError> {
    match &self.source {
      ManifestSource::Backend { base_url, .. } => {
        let url = join_url(base_url, "api/version");
        debug!(url = %url, "fetching version info");
        self.get_json(&url).await
      }
      ManifestSource::Repository(_) => Err(ManifestError::Unsupported {
        operation: "version info",
        source_kind: self.source.kind_name(),
      }),
    }
  }

  async fn get_json<D: DeserializeOwned>(&self, url: &str) -> Result<D, ManifestError> {
    let bytes = get_bytes(self.transport.as_ref(), url).await?;
    serde_json::from_slice(&bytes).map_err(|source| ManifestError::Decode {
      url: url.to_string(),
      source,
    })
  }
}
