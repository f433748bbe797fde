//! Archive detection and extraction.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::debug;

/// Supported package formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
  Zip,
  TarGz,
  Tar,
}

impl std::fmt::Display for ArchiveFormat {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ArchiveFormat::Zip => write!(f, "zip"),
      ArchiveFormat::TarGz => write!(f, "tar.gz"),
      ArchiveFormat::Tar => write!(f, "tar"),
    }
  }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("io error: {0}")]
  Io(#[from] io::Error),

  #[error("invalid zip archive: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("archive entry '{0}' escapes the destination")]
  UnsafePath(String),

  #[error("package is not a zip, tar.gz or tar archive")]
  Unrecognized,
}

/// Identify an archive by its leading bytes.
pub fn sniff(path: &Path) -> Result<ArchiveFormat, ArchiveError> {
  let mut header = Vec::with_capacity(512);
  File::open(path)?.take(512).read_to_end(&mut header)?;

  if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
    Ok(ArchiveFormat::Zip)
  } else if header.starts_with(&[0x1f, 0x8b]) {
    Ok(ArchiveFormat::TarGz)
  } else if header.get(257..262) == Some(b"ustar".as_slice()) {
    Ok(ArchiveFormat::Tar)
  } else {
    Err(ArchiveError::Unrecognized)
  }
}

/// Extract `archive_path` into `dest`, returning the number of files written.
///
/// Every entry must resolve inside `dest`.
pub fn unpack(archive_path: &Path, format: ArchiveFormat, dest: &Path) -> Result<usize, ArchiveError> {
  fs::create_dir_all(dest)?;

  let count = match format {
    ArchiveFormat::Zip => unpack_zip(archive_path, dest)?,
    ArchiveFormat::TarGz => {
      let decoder = GzDecoder::new(BufReader::new(File::open(archive_path)?));
      unpack_tar(Archive::new(decoder), dest)?
    }
    ArchiveFormat::Tar => unpack_tar(Archive::new(BufReader::new(File::open(archive_path)?)), dest)?,
  };

  debug!(%format, files = count, dest = %dest.display(), "unpacked archive");
  Ok(count)
}

/// Reject absolute paths and parent references.
fn confined(path: &Path) -> Result<PathBuf, ArchiveError> {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::Normal(part) => out.push(part),
      Component::CurDir => {}
      _ => return Err(ArchiveError::UnsafePath(path.display().to_string())),
    }
  }
  Ok(out)
}

fn unpack_tar<R: Read>(mut archive: Archive<R>, dest: &Path) -> Result<usize, ArchiveError> {
  let mut count = 0;

  for entry in archive.entries()? {
    let mut entry = entry?;
    let relative = confined(&entry.path()?)?;
    if relative.as_os_str().is_empty() {
      continue;
    }

    // Also refuses entries that would land outside `dest` through an unpacked symlink.
    if !entry.unpack_in(dest)? {
      return Err(ArchiveError::UnsafePath(relative.display().to_string()));
    }

    if entry.header().entry_type().is_file() {
      count += 1;
    }
  }

  Ok(count)
}

fn unpack_zip(archive_path: &Path, dest: &Path) -> Result<usize, ArchiveError> {
  let mut archive = zip::ZipArchive::new(BufReader::new(File::open(archive_path)?))?;
  let mut count = 0;

  for i in 0..archive.len() {
    let mut file = archive.by_index(i)?;
    let relative = file
      .enclosed_name()
      .ok_or_else(|| ArchiveError::UnsafePath(file.name().to_string()))?;
    let dest_path = dest.join(confined(&relative)?);

    if file.is_dir() {
      fs::create_dir_all(&dest_path)?;
      continue;
    }

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut outfile = File::create(&dest_path)?;
    io::copy(&mut file, &mut outfile)?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      if let Some(mode) = file.unix_mode() {
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))?;
      }
    }
    count += 1;
  }

  Ok(count)
}
