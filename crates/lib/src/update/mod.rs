//! Update orchestration.
//!
//! [`Updater`] drives one reconciliation at a time through an explicit state machine:
//!
//! ```text
//! Idle -> CheckingCache -> FetchingManifest -> Planning -> AwaitingConfirmation
//!      -> Updating -> Finalizing -> Idle
//! ```
//!
//! `check` runs up to `AwaitingConfirmation` and stops: applying a plan always needs an
//! explicit `apply` call. The state sits behind a mutex so a UI and a worker task can share one
//! `Arc<Updater>`.

mod restart;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use restart::RestartAction;

use crate::cache::{CacheError, CacheRecord, CacheStore, is_fresh};
use crate::consts::{CACHE_FILENAME, DEFAULT_FRESHNESS_SECS};
use crate::fetch::{FileFetchError, FileFetcher, RetryPolicy};
use crate::install::{InstallError, InstalledPackage, PackageInstaller};
use crate::manifest::{Manifest, ManifestClient, ManifestError, ManifestSource, VersionInfo};
use crate::plan::{PlanError, PlanOutcome, UpdatePlan, compute_plan};
use crate::progress::{Phase, ProgressEvent, ProgressSink};
use crate::transport::HttpTransport;

/// Settings for an [`Updater`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterConfig {
  /// Version of the application currently installed.
  pub installed_version: String,
  /// Directory the manifest's entries are relative to.
  pub install_dir: PathBuf,
  pub cache_file: PathBuf,
  /// How long a cached manifest is trusted without asking the remote.
  pub freshness: Duration,
  /// Relaunched after a successful update, when set.
  pub executable: Option<PathBuf>,
  /// Where bulk installs move the previous installation.
  pub backup_dir: PathBuf,
  /// Longest wait for a manifest rate limit to reset before giving up on it.
  pub rate_limit_max_wait: Duration,
  pub retry: RetryPolicy,
}

impl UpdaterConfig {
  pub fn new(installed_version: impl Into<String>, install_dir: impl Into<PathBuf>) -> Self {
    let install_dir = install_dir.into();
    Self {
      installed_version: installed_version.into(),
      cache_file: install_dir.join(CACHE_FILENAME),
      install_dir,
      freshness: Duration::from_secs(DEFAULT_FRESHNESS_SECS),
      executable: None,
      backup_dir: std::env::temp_dir(),
      rate_limit_max_wait: Duration::ZERO,
      retry: RetryPolicy::default(),
    }
  }
}

/// How the last cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleResult {
  Succeeded,
  Failed(String),
}

/// Where the updater is in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
  Idle(Option<CycleResult>),
  CheckingCache,
  FetchingManifest,
  Planning,
  /// A non-empty plan is waiting for the user.
  AwaitingConfirmation { manifest: Manifest, plan: UpdatePlan },
  Updating,
  Finalizing,
}

impl UpdateState {
  pub fn name(&self) -> &'static str {
    match self {
      UpdateState::Idle(_) => "idle",
      UpdateState::CheckingCache => "checking cache",
      UpdateState::FetchingManifest => "fetching manifest",
      UpdateState::Planning => "planning",
      UpdateState::AwaitingConfirmation { .. } => "awaiting confirmation",
      UpdateState::Updating => "updating",
      UpdateState::Finalizing => "finalizing",
    }
  }

  fn is_updating(&self) -> bool {
    matches!(self, UpdateState::Updating | UpdateState::Finalizing)
  }

  fn is_checking(&self) -> bool {
    matches!(
      self,
      UpdateState::CheckingCache | UpdateState::FetchingManifest | UpdateState::Planning
    )
  }
}

/// Where the manifest used by a check came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestOrigin {
  Remote,
  /// A cache record inside the freshness window.
  FreshCache,
  /// An expired cache record, used because the remote was unreachable.
  StaleCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
  UpToDate,
  UpdateAvailable { files: usize, bytes: u64 },
  /// The remote declares another version; only a package install can reach it.
  FullUpgradeRequired { available: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
  pub origin: ManifestOrigin,
  pub version: Option<String>,
  pub outcome: CheckOutcome,
}

#[derive(Debug)]
pub enum ApplyOutcome {
  Updated {
    files: usize,
    restart: Option<RestartAction>,
  },
  Installed {
    package: InstalledPackage,
    restart: Option<RestartAction>,
  },
  /// Another update was already running; nothing was done.
  AlreadyUpdating,
}

/// Errors that can occur during an update cycle.
#[derive(Debug, Error)]
pub enum UpdateError {
  #[error("cannot start while {state}")]
  Busy { state: &'static str },

  #[error("no update is awaiting confirmation (state: {state})")]
  NotAwaitingConfirmation { state: &'static str },

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error("failed to plan update: {0}")]
  Plan(#[from] PlanError),

  #[error("failed to update {name}: {source}")]
  File {
    name: String,
    #[source]
    source: FileFetchError,
  },

  #[error(transparent)]
  Install(#[from] InstallError),

  #[error("update cancelled")]
  Cancelled,
}

/// The reconciliation engine.
#[derive(Debug)]
pub struct Updater<T> {
  transport: Arc<T>,
  client: ManifestClient<T>,
  cache: CacheStore,
  config: UpdaterConfig,
  state: Mutex<UpdateState>,
  last_checked: Mutex<Option<DateTime<Utc>>>,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: HttpTransport> Updater<T> {
  pub fn new(transport: Arc<T>, source: ManifestSource, config: UpdaterConfig) -> Self {
    Self {
      client: ManifestClient::new(transport.clone(), source),
      cache: CacheStore::new(config.cache_file.clone()),
      transport,
      config,
      state: Mutex::new(UpdateState::Idle(None)),
      last_checked: Mutex::new(None),
    }
  }

  pub fn state(&self) -> UpdateState {
    lock(&self.state).clone()
  }

  /// When the remote manifest was last fetched successfully.
  pub fn last_checked(&self) -> Option<DateTime<Utc>> {
    *lock(&self.last_checked)
  }

  pub fn config(&self) -> &UpdaterConfig {
    &self.config
  }

  pub fn cache(&self) -> &CacheStore {
    &self.cache
  }

  pub fn client(&self) -> &ManifestClient<T> {
    &self.client
  }

  /// Ask the backend which versions exist.
  pub async fn version_info(&self) -> Result<VersionInfo, ManifestError> {
    self.client.fetch_version_info().await
  }

  fn set_state(&self, state: UpdateState) {
    let mut current = lock(&self.state);
    debug!(from = current.name(), to = state.name(), "state transition");
    *current = state;
  }

  fn fail<S: ProgressSink>(&self, sink: &S, err: UpdateError) -> UpdateError {
    let message = err.to_string();
    warn!(error = %message, "update cycle failed");
    sink.emit(ProgressEvent::Failed {
      message: message.clone(),
    });
    self.set_state(UpdateState::Idle(Some(CycleResult::Failed(message))));
    err
  }

  /// Determine whether anything needs updating.
  ///
  /// A cache record inside the freshness window is used without contacting the remote. When
  /// the remote fails, an expired record is used instead; with no record at all the error is
  /// returned and the updater goes back to idle.
  pub async fn check<S: ProgressSink>(&self, sink: &S) -> Result<CheckReport, UpdateError> {
    {
      let mut state = lock(&self.state);
      if state.is_updating() || state.is_checking() {
        return Err(UpdateError::Busy { state: state.name() });
      }
      *state = UpdateState::CheckingCache;
    }
    sink.status(Phase::Check, "Checking for updates...");

    let now = Utc::now();
    let cached = match self.cache.load() {
      Ok(record) => Some(record),
      Err(CacheError::NotFound(_)) => None,
      Err(err) => {
        warn!(error = %err, "ignoring unreadable cache");
        None
      }
    };

    let fresh = cached
      .as_ref()
      .filter(|record| is_fresh(record, now, self.config.freshness))
      .and_then(|record| usable(record));

    let (manifest, origin) = match fresh {
      Some(manifest) => {
        debug!(last_updated = %manifest.fetched_at(), "using cached manifest");
        (manifest, ManifestOrigin::FreshCache)
      }
      None => {
        self.set_state(UpdateState::FetchingManifest);
        match self.fetch_manifest(sink).await {
          Ok(manifest) => {
            if let Err(err) = self.cache.save(&CacheRecord::from_manifest(&manifest, Utc::now())) {
              warn!(error = %err, "failed to save manifest cache");
            }
            *lock(&self.last_checked) = Some(manifest.fetched_at());
            (manifest, ManifestOrigin::Remote)
          }
          Err(err) => match cached.as_ref().and_then(usable) {
            Some(manifest) => {
              warn!(error = %err, "manifest fetch failed, using cached data");
              sink.status(Phase::Check, "Error connecting to server. Using cached data...");
              (manifest, ManifestOrigin::StaleCache)
            }
            None => return Err(self.fail(sink, err.into())),
          },
        }
      }
    };

    self.set_state(UpdateState::Planning);
    let outcome = match compute_plan(&manifest, &self.config.install_dir, &self.config.installed_version) {
      Ok(outcome) => outcome,
      Err(err) => return Err(self.fail(sink, err.into())),
    };

    let version = manifest.version().map(str::to_string);
    let outcome = match outcome {
      PlanOutcome::FullUpgradeRequired { available } => {
        info!(installed = %self.config.installed_version, %available, "new version available");
        sink.status(Phase::Check, format!("New version available: {}", available));
        self.set_state(UpdateState::Idle(Some(CycleResult::Succeeded)));
        CheckOutcome::FullUpgradeRequired { available }
      }
      PlanOutcome::Files(plan) if plan.is_empty() => {
        info!("application is up to date");
        sink.status(Phase::Check, "Your application is up to date");
        self.set_state(UpdateState::Idle(Some(CycleResult::Succeeded)));
        CheckOutcome::UpToDate
      }
      PlanOutcome::Files(plan) => {
        let (files, bytes) = (plan.len(), plan.total_size());
        info!(files, bytes, "updates available");
        sink.status(Phase::Check, format!("Found {} file(s) to update", files));
        self.set_state(UpdateState::AwaitingConfirmation { manifest, plan });
        CheckOutcome::UpdateAvailable { files, bytes }
      }
    };

    Ok(CheckReport {
      origin,
      version,
      outcome,
    })
  }

  /// Fetch the manifest, waiting out one rate limit when its reset is close enough.
  async fn fetch_manifest<S: ProgressSink>(&self, sink: &S) -> Result<Manifest, ManifestError> {
    let err = match self.client.fetch_manifest().await {
      Ok(manifest) => return Ok(manifest),
      Err(err) => err,
    };

    let wait = err
      .quota()
      .and_then(|quota| quota.reset_at)
      .map(|reset_at| (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
      .filter(|wait| *wait <= self.config.rate_limit_max_wait);

    match wait {
      Some(wait) if !self.config.rate_limit_max_wait.is_zero() => {
        warn!(wait = ?wait, "manifest rate limited, waiting for reset");
        sink.status(
          Phase::Check,
          format!("Rate limited. Retrying in {} seconds...", wait.as_secs()),
        );
        tokio::time::sleep(wait).await;
        self.client.fetch_manifest().await
      }
      _ => Err(err),
    }
  }

  /// Apply the plan found by the last [`check`](Self::check).
  ///
  /// Files are fetched one at a time in plan order; the first failure aborts the cycle and
  /// files already replaced stay replaced. Calling this while an update runs is a no-op.
  pub async fn apply<S: ProgressSink>(&self, sink: &S, cancel: &CancellationToken) -> Result<ApplyOutcome, UpdateError> {
    let plan = {
      let mut state = lock(&self.state);
      if state.is_updating() {
        return Ok(ApplyOutcome::AlreadyUpdating);
      }
      match std::mem::replace(&mut *state, UpdateState::Updating) {
        UpdateState::AwaitingConfirmation { plan, .. } => plan,
        other => {
          let name = other.name();
          *state = other;
          return Err(UpdateError::NotAwaitingConfirmation { state: name });
        }
      }
    };

    let total = plan.len();
    info!(files = total, "applying update");
    sink.status(Phase::Update, "Starting update...");
    sink.percent(Phase::Update, 0.0);

    let fetcher = FileFetcher::new(self.transport.clone(), self.client.source().clone(), self.config.retry);
    for (index, entry) in plan.entries().enumerate() {
      if cancel.is_cancelled() {
        return Err(self.fail(sink, UpdateError::Cancelled));
      }
      sink.status(Phase::Update, format!("Updating {}...", entry.name));

      match fetcher
        .fetch_and_apply(entry, &self.config.install_dir, sink, cancel)
        .await
      {
        Ok(_) => {}
        Err(FileFetchError::Cancelled) => return Err(self.fail(sink, UpdateError::Cancelled)),
        Err(source) => {
          return Err(self.fail(
            sink,
            UpdateError::File {
              name: entry.name.clone(),
              source,
            },
          ));
        }
      }

      sink.percent(Phase::Update, (index + 1) as f64 / total as f64 * 100.0);
    }

    self.finalize(sink, Phase::Update, "Update completed successfully!");
    Ok(ApplyOutcome::Updated {
      files: total,
      restart: self.restart_action(),
    })
  }

  /// Replace the whole installation with the source's latest package.
  pub async fn install_package<S: ProgressSink>(
    &self,
    sink: &S,
    cancel: &CancellationToken,
  ) -> Result<ApplyOutcome, UpdateError> {
    {
      let mut state = lock(&self.state);
      if state.is_updating() {
        return Ok(ApplyOutcome::AlreadyUpdating);
      }
      if state.is_checking() {
        return Err(UpdateError::Busy { state: state.name() });
      }
      *state = UpdateState::Updating;
    }

    let Some(url) = self.client.source().package_url() else {
      return Err(self.fail(sink, InstallError::NoPackage.into()));
    };

    let installer = PackageInstaller::new(self.transport.clone(), self.config.backup_dir.clone());
    let package = match installer.install(&url, &self.config.install_dir, sink, cancel).await {
      Ok(package) => package,
      Err(InstallError::Cancelled) => return Err(self.fail(sink, UpdateError::Cancelled)),
      Err(err) => return Err(self.fail(sink, err.into())),
    };

    self.finalize(sink, Phase::Install, "Installation completed successfully!");
    Ok(ApplyOutcome::Installed {
      package,
      restart: self.restart_action(),
    })
  }

  fn finalize<S: ProgressSink>(&self, sink: &S, phase: Phase, message: &str) {
    self.set_state(UpdateState::Finalizing);
    if let Err(err) = self.cache.invalidate() {
      warn!(error = %err, "failed to invalidate manifest cache");
    }
    sink.status(phase, message);
    self.set_state(UpdateState::Idle(Some(CycleResult::Succeeded)));
  }

  /// Relaunch the configured executable, or the running binary when none is configured.
  fn restart_action(&self) -> Option<RestartAction> {
    match &self.config.executable {
      Some(exe) if exe.is_absolute() => Some(RestartAction::new(exe)),
      Some(exe) => Some(RestartAction::new(self.config.install_dir.join(exe))),
      None => match std::env::current_exe() {
        Ok(exe) => Some(RestartAction::new(exe)),
        Err(err) => {
          warn!(error = %err, "cannot determine the running executable");
          None
        }
      },
    }
  }
}

fn usable(record: &CacheRecord) -> Option<Manifest> {
  match record.to_manifest() {
    Ok(manifest) => Some(manifest),
    Err(err) => {
      warn!(error = %err, "ignoring invalid cache record");
      None
    }
  }
}
