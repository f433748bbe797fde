//! Whole-package installation.
//!
//! The bulk path replaces the entire install directory with the contents of a downloaded
//! archive. The previous contents are moved to a timestamped backup directory first, so a bad
//! package can be rolled back by hand.

pub(crate) mod archive;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub use archive::{ArchiveError, ArchiveFormat};

use crate::fetch::{Backoff, sleep_or_cancel};
use crate::progress::{Phase, ProgressSink};
use crate::transport::{FetchError, HttpTransport, ResponseBody};

const DEFAULT_ATTEMPTS: u32 = 3;

/// Errors that can occur during a package install.
#[derive(Debug, Error)]
pub enum InstallError {
  /// The source publishes no package.
  #[error("no installation package is available from this source")]
  NoPackage,

  #[error("failed to download {url} after {attempts} attempts: {source}")]
  Network {
    url: String,
    attempts: u32,
    #[source]
    source: FetchError,
  },

  #[error("failed to prepare {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to extract package: {0}")]
  Archive(#[from] ArchiveError),

  #[error("installation cancelled")]
  Cancelled,
}

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
  pub format: ArchiveFormat,
  /// Files extracted into the install directory.
  pub files: usize,
  /// Package size in bytes.
  pub bytes: u64,
  /// Where the previous contents went, if there were any.
  pub backup: Option<PathBuf>,
}

/// Downloads and unpacks application packages.
#[derive(Debug)]
pub struct PackageInstaller<T> {
  transport: Arc<T>,
  backup_root: PathBuf,
  attempts: u32,
  backoff: Backoff,
}

impl<T: HttpTransport> PackageInstaller<T> {
  pub fn new(transport: Arc<T>, backup_root: impl Into<PathBuf>) -> Self {
    Self {
      transport,
      backup_root: backup_root.into(),
      attempts: DEFAULT_ATTEMPTS,
      backoff: Backoff::Exponential {
        base: Duration::from_secs(1),
      },
    }
  }

  pub fn with_retry(mut self, attempts: u32, backoff: Backoff) -> Self {
    self.attempts = attempts.max(1);
    self.backoff = backoff;
    self
  }

  /// Install the package at `url` into `install_dir`.
  ///
  /// Reports 10% once the directory is ready, 20% to 60% while downloading (when the size is
  /// known), 60% before extraction, then 80% and 100%.
  pub async fn install<S: ProgressSink>(
    &self,
    url: &str,
    install_dir: &Path,
    sink: &S,
    cancel: &CancellationToken,
  ) -> Result<InstalledPackage, InstallError> {
    sink.status(Phase::Install, "Preparing installation directory...");
    tokio::fs::create_dir_all(install_dir).await.map_err(|source| InstallError::Io {
      path: install_dir.to_path_buf(),
      source,
    })?;
    sink.percent(Phase::Install, 10.0);

    sink.status(Phase::Install, "Downloading latest version...");
    sink.percent(Phase::Install, 20.0);
    let (package, bytes) = self.download_with_retry(url, sink, cancel).await?;

    if cancel.is_cancelled() {
      return Err(InstallError::Cancelled);
    }

    sink.status(Phase::Install, "Extracting files...");
    sink.percent(Phase::Install, 60.0);

    let dir = install_dir.to_path_buf();
    let backup_root = self.backup_root.clone();
    let (format, files, backup) = tokio::task::spawn_blocking(move || -> Result<_, InstallError> {
      let format = archive::sniff(package.path())?;
      let backup = backup_contents(&dir, &backup_root)?;
      let files = archive::unpack(package.path(), format, &dir)?;
      Ok((format, files, backup))
    })
    .await
    .map_err(|e| InstallError::Io {
      path: install_dir.to_path_buf(),
      source: io::Error::other(e),
    })??;

    sink.status(Phase::Install, "Finalizing installation...");
    sink.percent(Phase::Install, 80.0);

    info!(url = %url, %format, files, bytes, "package installed");
    sink.percent(Phase::Install, 100.0);

    Ok(InstalledPackage {
      format,
      files,
      bytes,
      backup,
    })
  }

  async fn download_with_retry<S: ProgressSink>(
    &self,
    url: &str,
    sink: &S,
    cancel: &CancellationToken,
  ) -> Result<(NamedTempFile, u64), InstallError> {
    let mut attempt = 0;
    loop {
      attempt += 1;
      if cancel.is_cancelled() {
        return Err(InstallError::Cancelled);
      }

      match self.download(url, sink, cancel).await {
        Ok(done) => return Ok(done),
        Err(DownloadError::Fatal(err)) => return Err(err),
        Err(DownloadError::Transport(source)) if attempt >= self.attempts => {
          return Err(InstallError::Network {
            url: url.to_string(),
            attempts: attempt,
            source,
          });
        }
        Err(DownloadError::Transport(err)) => {
          let delay = self.backoff.delay(attempt);
          warn!(url = %url, attempt, error = %err, retry_in = ?delay, "package download failed, retrying");
          sink.status(
            Phase::Install,
            format!("Retry attempt {} of {}...", attempt + 1, self.attempts),
          );
          if !sleep_or_cancel(delay, cancel).await {
            return Err(InstallError::Cancelled);
          }
        }
      }
    }
  }

  async fn download<S: ProgressSink>(
    &self,
    url: &str,
    sink: &S,
    cancel: &CancellationToken,
  ) -> Result<(NamedTempFile, u64), DownloadError> {
    let mut body = self.transport.open(url).await.map_err(DownloadError::Transport)?;
    let total = body.content_length().filter(|len| *len > 0);

    let temp_err = |source: io::Error| {
      DownloadError::Fatal(InstallError::Io {
        path: std::env::temp_dir(),
        source,
      })
    };
    let mut package = NamedTempFile::new().map_err(temp_err)?;
    let mut read = 0u64;

    while let Some(chunk) = body.next_chunk().await.map_err(DownloadError::Transport)? {
      if cancel.is_cancelled() {
        return Err(DownloadError::Fatal(InstallError::Cancelled));
      }
      package.write_all(&chunk).map_err(temp_err)?;
      read += chunk.len() as u64;
      if let Some(total) = total {
        sink.percent(Phase::Install, 20.0 + 40.0 * (read as f64 / total as f64));
      }
    }
    package.flush().map_err(temp_err)?;

    debug!(url = %url, bytes = read, "package downloaded");
    Ok((package, read))
  }
}

enum DownloadError {
  Transport(FetchError),
  Fatal(InstallError),
}

/// Name of the backup directory for `install_dir`, stamped with the current local time.
pub fn backup_dir_name(install_dir: &Path) -> String {
  let base = install_dir
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "install".to_string());
  format!("{}-backup-{}", base, Local::now().format("%Y%m%d%H%M%S%3f"))
}

/// Move everything inside `install_dir` into a fresh backup directory under `backup_root`.
///
/// Returns `None` when there was nothing to move. Entries that cannot be renamed (for example
/// across filesystems) are copied and then removed.
fn backup_contents(install_dir: &Path, backup_root: &Path) -> Result<Option<PathBuf>, InstallError> {
  let io_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source| InstallError::Io { path, source }
  };

  let children: Vec<_> = std::fs::read_dir(install_dir)
    .map_err(io_err(install_dir))?
    .collect::<Result<_, _>>()
    .map_err(io_err(install_dir))?;
  if children.is_empty() {
    return Ok(None);
  }

  let backup = backup_root.join(backup_dir_name(install_dir));
  std::fs::create_dir_all(&backup).map_err(io_err(&backup))?;

  for child in children {
    let from = child.path();
    let to = backup.join(child.file_name());
    if std::fs::rename(&from, &to).is_err() {
      copy_recursive(&from, &to).map_err(io_err(&from))?;
      remove_path(&from).map_err(io_err(&from))?;
    }
  }

  info!(backup = %backup.display(), "previous installation moved to backup");
  Ok(Some(backup))
}

fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
  for entry in WalkDir::new(from) {
    let entry = entry.map_err(io::Error::other)?;
    let relative = entry.path().strip_prefix(from).map_err(io::Error::other)?;
    let dest = to.join(relative);
    if entry.file_type().is_dir() {
      std::fs::create_dir_all(&dest)?;
    } else {
      if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
      }
      std::fs::copy(entry.path(), &dest)?;
    }
  }
  Ok(())
}

fn remove_path(path: &Path) -> io::Result<()> {
  if std::fs::symlink_metadata(path)?.is_dir() {
    std::fs::remove_dir_all(path)
  } else {
    std::fs::remove_file(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::progress::ProgressEvent;
  use crate::util::testutil::{FakeTransport, Reply};
  use tempfile::TempDir;

  const URL: &str = "http://updates.test/api/latest";

  fn installer(transport: FakeTransport, backup_root: &Path) -> PackageInstaller<FakeTransport> {
    PackageInstaller::new(Arc::new(transport), backup_root).with_retry(
      3,
      Backoff::Exponential {
        base: Duration::ZERO,
      },
    )
  }

  fn package() -> Vec<u8> {
    archive::tests::zip_bytes(&[("app.exe", "new exe"), ("lib/a.dll", "new dll")])
  }

  #[tokio::test]
  async fn installs_into_empty_dir_with_progress() {
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("app");
    let data = package();
    let half = data.len() / 2;

    let transport = FakeTransport::new();
    transport.push(URL, Reply::chunked(vec![data[..half].to_vec(), data[half..].to_vec()]));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let installed = installer(transport, temp.path())
      .install(URL, &install_dir, &tx, &CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(installed.format, ArchiveFormat::Zip);
    assert_eq!(installed.files, 2);
    assert_eq!(installed.backup, None);
    assert_eq!(std::fs::read(install_dir.join("lib/a.dll")).unwrap(), b"new dll");

    let mut percents = Vec::new();
    while let Ok(event) = rx.try_recv() {
      if let ProgressEvent::Percent { percent, .. } = event {
        percents.push(percent);
      }
    }
    assert_eq!(percents.first(), Some(&10.0));
    assert_eq!(percents.last(), Some(&100.0));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert!(percents.iter().any(|p| *p > 20.0 && *p < 60.0));
  }

  #[tokio::test]
  async fn moves_previous_contents_to_backup() {
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("app");
    let backups = temp.path().join("backups");
    std::fs::create_dir_all(install_dir.join("old")).unwrap();
    std::fs::write(install_dir.join("app.exe"), b"old exe").unwrap();
    std::fs::write(install_dir.join("old/stale.txt"), b"stale").unwrap();

    let transport = FakeTransport::new();
    transport.push(URL, Reply::bytes(package()));

    let installed = installer(transport, &backups)
      .install(URL, &install_dir, &crate::progress::NoProgress, &CancellationToken::new())
      .await
      .unwrap();

    let backup = installed.backup.unwrap();
    assert!(backup.starts_with(&backups));
    assert!(
      backup
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("app-backup-")
    );
    assert_eq!(std::fs::read(backup.join("app.exe")).unwrap(), b"old exe");
    assert_eq!(std::fs::read(backup.join("old/stale.txt")).unwrap(), b"stale");
    assert_eq!(std::fs::read(install_dir.join("app.exe")).unwrap(), b"new exe");
    assert!(!install_dir.join("old").exists());
  }

  #[tokio::test]
  async fn retries_then_gives_up() {
    let temp = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    transport.always(URL, Reply::Status(503));
    let installer = installer(transport, temp.path());

    let err = installer
      .install(URL, &temp.path().join("app"), &crate::progress::NoProgress, &CancellationToken::new())
      .await
      .unwrap_err();

    assert!(matches!(err, InstallError::Network { attempts: 3, .. }));
    assert_eq!(installer.transport.calls().len(), 3);
  }

  #[tokio::test]
  async fn garbage_package_keeps_existing_install() {
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("app");
    std::fs::create_dir_all(&install_dir).unwrap();
    std::fs::write(install_dir.join("app.exe"), b"old exe").unwrap();

    let transport = FakeTransport::new();
    transport.push(URL, Reply::bytes("<html>maintenance</html>"));

    let err = installer(transport, &temp.path().join("backups"))
      .install(URL, &install_dir, &crate::progress::NoProgress, &CancellationToken::new())
      .await
      .unwrap_err();

    assert!(matches!(err, InstallError::Archive(ArchiveError::Unrecognized)));
    assert_eq!(std::fs::read(install_dir.join("app.exe")).unwrap(), b"old exe");
  }

  #[test]
  fn backup_name_is_timestamped() {
    let name = backup_dir_name(Path::new("/opt/launcher"));
    let stamp = name.strip_prefix("launcher-backup-").unwrap();
    assert_eq!(stamp.len(), 17);
    assert!(stamp.chars().all(|c| c.is_ascii_digit()));
  }
}
