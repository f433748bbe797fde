//! Settings file handling.
//!
//! Settings live in `upkeep.toml`. The file is located with the following priority:
//! 1. An explicit path (the `--config` flag)
//! 2. `$UPKEEP_CONFIG`
//! 3. `./upkeep.toml` in the current directory
//! 4. `upkeep.toml` in the user config directory
//!
//! Every field is optional in the file; values that are still missing once command-line
//! overrides are applied are reported when building the [`UpdaterConfig`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{
  CACHE_FILENAME, DEFAULT_BRANCH, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FRESHNESS_SECS, DEFAULT_MAX_ATTEMPTS,
  DEFAULT_RATE_LIMIT_DELAY_SECS, DEFAULT_REPOSITORY_API_URL, DEFAULT_REPOSITORY_RAW_URL,
  DEFAULT_REPOSITORY_RELEASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS, SETTINGS_ENV_VAR, SETTINGS_FILENAME,
};
use crate::fetch::{Backoff, RetryPolicy};
use crate::manifest::{ManifestSource, RepositorySource};
use crate::platform::paths::{config_dir, exe_dir};
use crate::update::UpdaterConfig;
use crate::util::hash::DigestKind;

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// An explicitly requested settings file does not exist.
  #[error("settings file not found: {}", .0.display())]
  NotFound(PathBuf),

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  /// A required value is neither in the file nor overridden.
  #[error("missing setting '{0}'")]
  Missing(&'static str),

  #[error("cannot determine install directory: {0}")]
  InstallDir(#[source] io::Error),
}

/// Contents of `upkeep.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
  pub installed_version: Option<String>,
  /// Defaults to the directory of the running executable.
  pub install_dir: Option<PathBuf>,
  /// Relative paths resolve against `install_dir`.
  pub cache_file: Option<PathBuf>,
  pub freshness_secs: Option<u64>,
  pub executable: Option<PathBuf>,
  pub backup_dir: Option<PathBuf>,
  pub rate_limit_max_wait_secs: Option<u64>,
  pub source: Option<SourceSettings>,
  pub retry: RetrySettings,
  pub http: HttpSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSettings {
  Backend {
    url: String,
    #[serde(default)]
    fallback_url: Option<String>,
    /// `content` (MD5, the default) or `sha256`.
    #[serde(default)]
    digest: DigestKind,
  },
  Repository {
    owner: String,
    repo: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    raw_url: Option<String>,
    #[serde(default)]
    release_url: Option<String>,
    #[serde(default)]
    package_asset: Option<String>,
  },
}

impl SourceSettings {
  pub fn to_source(&self) -> ManifestSource {
    match self {
      SourceSettings::Backend {
        url,
        fallback_url,
        digest,
      } => ManifestSource::Backend {
        base_url: url.clone(),
        fallback_url: fallback_url.clone(),
        digest: *digest,
      },
      SourceSettings::Repository {
        owner,
        repo,
        branch,
        path,
        api_url,
        raw_url,
        release_url,
        package_asset,
      } => ManifestSource::Repository(RepositorySource {
        owner: owner.clone(),
        repo: repo.clone(),
        branch: branch.clone().unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        path: path.clone().unwrap_or_default(),
        api_url: api_url.clone().unwrap_or_else(|| DEFAULT_REPOSITORY_API_URL.to_string()),
        raw_url: raw_url.clone().unwrap_or_else(|| DEFAULT_REPOSITORY_RAW_URL.to_string()),
        release_url: release_url
          .clone()
          .unwrap_or_else(|| DEFAULT_REPOSITORY_RELEASE_URL.to_string()),
        package_asset: package_asset.clone(),
      }),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
  #[default]
  Linear,
  Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
  pub max_attempts: u32,
  pub backoff: BackoffKind,
  pub rate_limit_delay_secs: u64,
}

impl Default for RetrySettings {
  fn default() -> Self {
    Self {
      max_attempts: DEFAULT_MAX_ATTEMPTS,
      backoff: BackoffKind::default(),
      rate_limit_delay_secs: DEFAULT_RATE_LIMIT_DELAY_SECS,
    }
  }
}

impl RetrySettings {
  pub fn policy(&self) -> RetryPolicy {
    let second = Duration::from_secs(1);
    RetryPolicy {
      max_attempts: self.max_attempts,
      backoff: match self.backoff {
        BackoffKind::Linear => Backoff::Linear { unit: second },
        BackoffKind::Exponential => Backoff::Exponential { base: second },
      },
      rate_limit_delay: Duration::from_secs(self.rate_limit_delay_secs),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
  pub connect_timeout_secs: u64,
  pub timeout_secs: u64,
}

impl Default for HttpSettings {
  fn default() -> Self {
    Self {
      connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
      timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
    }
  }
}

impl HttpSettings {
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_secs(self.connect_timeout_secs)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

/// Find the settings file.
///
/// Returns `Ok(None)` when no file exists in any default location.
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if an explicit path (flag or environment) does not exist.
pub fn find_settings_path(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
  // 1. Explicit path
  if let Some(path) = explicit {
    if path.exists() {
      return Ok(Some(path.to_path_buf()));
    }
    return Err(ConfigError::NotFound(path.to_path_buf()));
  }

  // 2. Environment
  if let Some(path) = std::env::var_os(SETTINGS_ENV_VAR).filter(|v| !v.is_empty()) {
    let path = PathBuf::from(path);
    if path.exists() {
      return Ok(Some(path));
    }
    return Err(ConfigError::NotFound(path));
  }

  // 3. ./upkeep.toml in current directory
  let cwd = PathBuf::from(".").join(SETTINGS_FILENAME);
  if cwd.exists() {
    return Ok(Some(cwd));
  }

  // 4. <config_dir>/upkeep.toml
  Ok(config_dir().map(|dir| dir.join(SETTINGS_FILENAME)).filter(|p| p.exists()))
}

impl Settings {
  /// Parse a settings file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), "loaded settings");
    Ok(settings)
  }

  /// Locate and parse the settings file, falling back to defaults when there is none.
  pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
    match find_settings_path(explicit)? {
      Some(path) => Ok((Self::load(&path)?, Some(path))),
      None => Ok((Self::default(), None)),
    }
  }

  pub fn manifest_source(&self) -> Result<ManifestSource, ConfigError> {
    self
      .source
      .as_ref()
      .map(SourceSettings::to_source)
      .ok_or(ConfigError::Missing("source"))
  }

  pub fn install_dir(&self) -> Result<PathBuf, ConfigError> {
    match &self.install_dir {
      Some(dir) => Ok(dir.clone()),
      None => exe_dir().map_err(ConfigError::InstallDir),
    }
  }

  pub fn freshness(&self) -> Duration {
    Duration::from_secs(self.freshness_secs.unwrap_or(DEFAULT_FRESHNESS_SECS))
  }

  /// Location of the manifest cache. Relative paths resolve against the install directory.
  pub fn cache_file(&self) -> Result<PathBuf, ConfigError> {
    match &self.cache_file {
      Some(path) if path.is_absolute() => Ok(path.clone()),
      Some(path) => Ok(self.install_dir()?.join(path)),
      None => Ok(self.install_dir()?.join(CACHE_FILENAME)),
    }
  }

  /// Build the updater configuration.
  pub fn updater_config(&self) -> Result<UpdaterConfig, ConfigError> {
    let installed_version = self
      .installed_version
      .clone()
      .ok_or(ConfigError::Missing("installed_version"))?;
    let install_dir = self.install_dir()?;
    let cache_file = self.cache_file()?;

    Ok(UpdaterConfig {
      installed_version,
      cache_file,
      freshness: self.freshness(),
      executable: self.executable.clone(),
      backup_dir: self.backup_dir.clone().unwrap_or_else(std::env::temp_dir),
      rate_limit_max_wait: Duration::from_secs(self.rate_limit_max_wait_secs.unwrap_or(0)),
      retry: self.retry.policy(),
      install_dir,
    })
  }
}
