//! Per-file download and replacement.
//!
//! [`FileFetcher`] streams one manifest entry into a temp file beside its target, keeps the
//! previous copy as `<name>.bak`, and renames the new file into place. Failed attempts are
//! retried under a [`RetryPolicy`]; once the primary route reports a rate limit, the fetcher
//! switches to the source's fallback URL for every remaining file it handles.

mod retry;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use retry::{Backoff, RetryPolicy, sleep_or_cancel};

use crate::consts::BACKUP_SUFFIX;
use crate::manifest::{ManifestEntry, ManifestSource};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::transport::{FetchError, HttpTransport, RateLimitQuota, ResponseBody};

/// Errors that can occur while fetching a file.
#[derive(Debug, Error)]
pub enum FileFetchError {
  /// Every attempt failed at the transport level.
  #[error("failed to download {name} after {attempts} attempts: {source}")]
  Network {
    name: String,
    attempts: u32,
    #[source]
    source: FetchError,
  },

  /// The last attempt was refused for quota reasons.
  #[error("rate limited while downloading {name} ({quota})")]
  RateLimited { name: String, quota: RateLimitQuota },

  /// Writing the file locally failed. Not retried.
  #[error("failed to write {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("download cancelled")]
  Cancelled,
}

enum AttemptError {
  Transport(FetchError),
  Local { path: PathBuf, source: io::Error },
  Cancelled,
}

/// Downloads manifest entries into a local directory.
///
/// One fetcher serves one update cycle: the fallback switch is never reset.
#[derive(Debug)]
pub struct FileFetcher<T> {
  transport: Arc<T>,
  source: ManifestSource,
  policy: RetryPolicy,
  use_fallback: AtomicBool,
}

impl<T: HttpTransport> FileFetcher<T> {
  pub fn new(transport: Arc<T>, source: ManifestSource, policy: RetryPolicy) -> Self {
    Self {
      transport,
      source,
      policy,
      use_fallback: AtomicBool::new(false),
    }
  }

  /// Whether a rate limit has moved this fetcher onto the fallback route.
  pub fn fallback_active(&self) -> bool {
    self.use_fallback.load(Ordering::Relaxed)
  }

  fn url_for(&self, entry: &ManifestEntry) -> String {
    let fallback = if self.fallback_active() {
      self.source.raw_url(&entry.name)
    } else {
      None
    };
    fallback.unwrap_or_else(|| self.source.entry_url(entry))
  }

  /// Download `entry` into `local_root`, replacing any existing copy.
  ///
  /// Makes at most `policy.max_attempts` transport calls. Local I/O errors abort immediately.
  pub async fn fetch_and_apply<S: ProgressSink>(
    &self,
    entry: &ManifestEntry,
    local_root: &Path,
    sink: &S,
    cancel: &CancellationToken,
  ) -> Result<PathBuf, FileFetchError> {
    let target = local_root.join(&entry.name);
    let attempts = self.policy.attempts();

    let mut attempt = 0;
    loop {
      attempt += 1;
      if cancel.is_cancelled() {
        return Err(FileFetchError::Cancelled);
      }

      let url = self.url_for(entry);
      debug!(name = %entry.name, url = %url, attempt, "downloading");

      let err = match self.download(&url, entry, &target, sink, cancel).await {
        Ok(bytes) => {
          info!(name = %entry.name, bytes, "file updated");
          return Ok(target);
        }
        Err(AttemptError::Cancelled) => return Err(FileFetchError::Cancelled),
        Err(AttemptError::Local { path, source }) => return Err(FileFetchError::Io { path, source }),
        Err(AttemptError::Transport(err)) => err,
      };

      let delay = match &err {
        FetchError::RateLimited { quota, .. } => {
          if attempt >= attempts {
            return Err(FileFetchError::RateLimited {
              name: entry.name.clone(),
              quota: quota.clone(),
            });
          }
          if !self.fallback_active() && self.source.raw_url(&entry.name).is_some() {
            warn!(name = %entry.name, %quota, "rate limited, switching to fallback downloads");
            self.use_fallback.store(true, Ordering::Relaxed);
          } else {
            warn!(name = %entry.name, %quota, "rate limited");
          }
          self.policy.rate_limit_delay
        }
        _ => {
          if attempt >= attempts {
            return Err(FileFetchError::Network {
              name: entry.name.clone(),
              attempts,
              source: err,
            });
          }
          let delay = self.policy.backoff.delay(attempt);
          warn!(name = %entry.name, attempt, error = %err, retry_in = ?delay, "download failed, retrying");
          delay
        }
      };

      if !sleep_or_cancel(delay, cancel).await {
        return Err(FileFetchError::Cancelled);
      }
    }
  }

  async fn download<S: ProgressSink>(
    &self,
    url: &str,
    entry: &ManifestEntry,
    target: &Path,
    sink: &S,
    cancel: &CancellationToken,
  ) -> Result<u64, AttemptError> {
    let dir = target.parent().unwrap_or(Path::new("."));
    let local = |source: io::Error| AttemptError::Local {
      path: target.to_path_buf(),
      source,
    };

    fs::create_dir_all(dir).await.map_err(local)?;
    let mut body = self.transport.open(url).await.map_err(AttemptError::Transport)?;

    let (file, temp_path) = NamedTempFile::new_in(dir).map_err(local)?.into_parts();
    let mut file = fs::File::from_std(file);
    let mut written = 0u64;

    while let Some(chunk) = body.next_chunk().await.map_err(AttemptError::Transport)? {
      if cancel.is_cancelled() {
        return Err(AttemptError::Cancelled);
      }
      file.write_all(&chunk).await.map_err(local)?;
      written += chunk.len() as u64;
      sink.emit(ProgressEvent::Transferred {
        name: entry.name.clone(),
        delta: chunk.len() as u64,
      });
    }
    file.flush().await.map_err(local)?;
    drop(file);

    backup_existing(target).await.map_err(local)?;
    temp_path.persist(target).map_err(|e| local(e.error))?;
    Ok(written)
  }
}

/// Path of the backup kept for `target`.
pub fn backup_path(target: &Path) -> PathBuf {
  let mut name = target.as_os_str().to_os_string();
  name.push(BACKUP_SUFFIX);
  PathBuf::from(name)
}

/// Keep the current `target` as `<target>.bak`, replacing an older backup.
///
/// Files are copied so the target stays in place until the rename; a directory occupying the
/// target path is moved aside.
async fn backup_existing(target: &Path) -> io::Result<()> {
  let metadata = match fs::symlink_metadata(target).await {
    Ok(metadata) => metadata,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e),
  };
  let backup = backup_path(target);

  if metadata.is_dir() {
    match fs::symlink_metadata(&backup).await {
      Ok(m) if m.is_dir() => fs::remove_dir_all(&backup).await?,
      Ok(_) => fs::remove_file(&backup).await?,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(e),
    }
    fs::rename(target, &backup).await?;
  } else {
    fs::copy(target, &backup).await?;
  }

  debug!(path = %backup.display(), "backup written");
  Ok(())
}
