//! Diff planning.
//!
//! Compares a manifest against the install directory and decides which files need to be
//! downloaded. A declared version that differs from the installed one short-circuits the
//! per-file comparison: the caller is expected to run a full package install instead.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::manifest::{Manifest, ManifestEntry};
use crate::util::hash::{DigestError, digest_of};

/// Why a file was included in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
  /// Nothing exists at the entry's path.
  Missing,
  /// The local digest differs from the declared one.
  Changed,
  /// A directory occupies the entry's path.
  Directory,
}

impl std::fmt::Display for StaleReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      StaleReason::Missing => write!(f, "missing"),
      StaleReason::Changed => write!(f, "changed"),
      StaleReason::Directory => write!(f, "directory in the way"),
    }
  }
}

/// A file the plan will fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
  pub entry: ManifestEntry,
  pub reason: StaleReason,
}

/// The ordered subset of manifest entries whose local copy is missing or stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
  pub files: Vec<PlannedFile>,
}

impl UpdatePlan {
  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  /// Planned entries in manifest order.
  pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
    self.files.iter().map(|f| &f.entry)
  }

  /// Declared bytes to download.
  pub fn total_size(&self) -> u64 {
    self.files.iter().map(|f| f.entry.size).sum()
  }
}

/// Result of planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
  /// The remote declares a different version; per-file updates do not apply.
  FullUpgradeRequired { available: String },
  /// Per-file plan; empty when everything is current.
  Files(UpdatePlan),
}

/// Errors that can occur during planning.
#[derive(Debug, Error)]
pub enum PlanError {
  /// Failed to inspect a local path.
  #[error("failed to inspect {}: {source}", path.display())]
  Inspect {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Failed to hash a local file.
  #[error(transparent)]
  Digest(#[from] DigestError),
}

/// Decide which manifest entries must be fetched into `local_root`.
///
/// Entries sharing a name collapse to the last one. Local digests are computed in the
/// manifest's digest space, so a content manifest is never compared against blob ids.
pub fn compute_plan(
  manifest: &Manifest,
  local_root: &Path,
  installed_version: &str,
) -> Result<PlanOutcome, PlanError> {
  if let Some(available) = manifest.version().filter(|v| *v != installed_version) {
    debug!(installed = installed_version, available, "version mismatch");
    return Ok(PlanOutcome::FullUpgradeRequired {
      available: available.to_string(),
    });
  }

  let entries = manifest.entries();
  let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
  for (index, entry) in entries.iter().enumerate() {
    if let Some(previous) = last_index.insert(entry.name.as_str(), index) {
      warn!(name = %entry.name, dropped = previous, kept = index, "duplicate manifest entry");
    }
  }

  let mut plan = UpdatePlan::default();
  for (index, entry) in entries.iter().enumerate() {
    if last_index.get(entry.name.as_str()) != Some(&index) {
      continue;
    }

    if let Some(reason) = stale_reason(entry, local_root, manifest)? {
      debug!(name = %entry.name, %reason, "planned");
      plan.files.push(PlannedFile {
        entry: entry.clone(),
        reason,
      });
    }
  }

  Ok(PlanOutcome::Files(plan))
}

fn stale_reason(entry: &ManifestEntry, local_root: &Path, manifest: &Manifest) -> Result<Option<StaleReason>, PlanError> {
  let path = local_root.join(&entry.name);

  let metadata = match fs::metadata(&path) {
    Ok(metadata) => metadata,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Some(StaleReason::Missing)),
    Err(source) => return Err(PlanError::Inspect { path, source }),
  };
  if metadata.is_dir() {
    return Ok(Some(StaleReason::Directory));
  }

  let local = digest_of(&path, manifest.digest_kind())?;
  if local != entry.digest {
    return Ok(Some(StaleReason::Changed));
  }
  Ok(None)
}
