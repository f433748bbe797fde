//! Command implementations and the glue they share.

mod cache;
mod check;
mod install;
mod update;
mod versions;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use upkeep_lib::config::{Settings, SourceSettings};
use upkeep_lib::manifest::ManifestClient;
use upkeep_lib::transport::ReqwestTransport;
use upkeep_lib::update::{ApplyOutcome, RestartAction, Updater};
use upkeep_lib::util::hash::DigestKind;

use crate::output::{OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success, print_warning};

pub use cache::{cmd_cache_clear, cmd_cache_show};
pub use check::cmd_check;
pub use install::cmd_install;
pub use update::cmd_update;
pub use versions::cmd_versions;

/// Options shared by every command.
pub struct GlobalOpts {
  pub config: Option<PathBuf>,
  pub backend: Option<String>,
  pub install_dir: Option<PathBuf>,
  pub installed_version: Option<String>,
  pub output: OutputFormat,
  pub verbose: bool,
}

impl GlobalOpts {
  /// Load settings and apply command-line overrides.
  pub fn settings(&self) -> Result<Settings> {
    let (mut settings, path) = Settings::discover(self.config.as_deref()).context("Failed to load settings")?;
    match &path {
      Some(path) => debug!(path = %path.display(), "using settings file"),
      None => debug!("no settings file found, using defaults"),
    }

    if let Some(url) = &self.backend {
      settings.source = Some(SourceSettings::Backend {
        url: url.clone(),
        fallback_url: None,
        digest: DigestKind::Content,
      });
    }
    if let Some(dir) = &self.install_dir {
      settings.install_dir = Some(dir.clone());
    }
    if let Some(version) = &self.installed_version {
      settings.installed_version = Some(version.clone());
    }
    Ok(settings)
  }

  fn transport(settings: &Settings) -> Result<Arc<ReqwestTransport>> {
    let transport = ReqwestTransport::new(settings.http.connect_timeout(), settings.http.timeout())
      .context("Failed to create HTTP client")?;
    Ok(Arc::new(transport))
  }

  pub fn client(&self) -> Result<(Settings, ManifestClient<ReqwestTransport>)> {
    let settings = self.settings()?;
    let source = settings
      .manifest_source()
      .context("No update source configured (set [source] in upkeep.toml or pass --backend)")?;
    let client = ManifestClient::new(Self::transport(&settings)?, source);
    Ok((settings, client))
  }

  pub fn updater(&self) -> Result<Updater<ReqwestTransport>> {
    let settings = self.settings()?;
    let source = settings
      .manifest_source()
      .context("No update source configured (set [source] in upkeep.toml or pass --backend)")?;
    let config = settings.updater_config().context("Invalid settings")?;
    Ok(Updater::new(Self::transport(&settings)?, source, config))
  }
}

/// A token cancelled by Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
  let token = CancellationToken::new();
  let child = token.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      child.cancel();
    }
  });
  token
}

/// Print the result of `update` or `install` and run the restart action when asked to.
pub fn report_outcome(
  opts: &GlobalOpts,
  outcome: ApplyOutcome,
  transferred: u64,
  elapsed: Duration,
  restart: bool,
) -> Result<()> {
  let action = match outcome {
    ApplyOutcome::AlreadyUpdating => {
      print_warning("An update is already in progress");
      return Ok(());
    }
    ApplyOutcome::Updated { files, restart: action } => {
      if opts.output.is_json() {
        print_json(&serde_json::json!({ "status": "updated", "files": files, "bytes": transferred }))?;
      } else {
        print_success(&format!(
          "Updated {} file(s) ({}) in {}",
          files,
          format_bytes(transferred),
          format_duration(elapsed)
        ));
      }
      action
    }
    ApplyOutcome::Installed { package, restart: action } => {
      if opts.output.is_json() {
        print_json(&serde_json::json!({
          "status": "installed",
          "format": package.format.to_string(),
          "files": package.files,
          "bytes": package.bytes,
          "backup": package.backup,
        }))?;
      } else {
        print_success(&format!(
          "Installed {} file(s) ({}) in {}",
          package.files,
          format_bytes(package.bytes),
          format_duration(elapsed)
        ));
        print_stat("Format", &package.format.to_string());
        if let Some(backup) = &package.backup {
          print_stat("Backup", &backup.display().to_string());
        }
      }
      action
    }
  };

  restart_if_requested(action, restart)
}

fn restart_if_requested(action: Option<RestartAction>, restart: bool) -> Result<()> {
  match (action, restart) {
    (Some(action), true) => {
      action
        .launch()
        .with_context(|| format!("Failed to relaunch {}", action.executable().display()))?;
      print_info("Restarting application...");
    }
    (None, true) => print_warning("No executable configured; restart the application manually"),
    (Some(_), false) => print_info("Restart the application to use the new version (or pass --restart)"),
    (None, false) => {}
  }
  Ok(())
}
