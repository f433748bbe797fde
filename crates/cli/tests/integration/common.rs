//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::json;
use tempfile::TempDir;
use upkeep_lib::util::hash::hash_bytes;

/// Isolated test environment.
///
/// Each test gets its own temporary install directory with an `upkeep.toml` in it.
pub struct TestEnv {
  pub temp: TempDir,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// Settings for a backend at `url` with version 1.0.0 installed.
  pub fn with_backend(url: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("upkeep.toml");
    let content = format!(
      r#"installed_version = "1.0.0"
install_dir = '{}'

[source]
kind = "backend"
url = "{}"

[retry]
max_attempts = 2
rate_limit_delay_secs = 0
"#,
      temp.path().display(),
      url
    );
    std::fs::write(&config_path, content).unwrap();
    Self { temp, config_path }
  }

  pub fn install_dir(&self) -> &Path {
    self.temp.path()
  }

  /// Write a file relative to the install directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.temp.path().join(relative_path)).unwrap()
  }

  /// Get a Command for the upkeep binary, pointed at this environment's settings.
  pub fn upkeep_cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("upkeep");
    cmd.env_remove("UPKEEP_CONFIG").arg("--config").arg(&self.config_path);
    cmd
  }
}

/// A backend `/api/files` body for the given `(name, contents)` pairs.
pub fn listing(version: &str, files: &[(&str, &str)]) -> String {
  let files: Vec<_> = files
    .iter()
    .map(|(name, data)| {
      json!({
        "name": name,
        "size": data.len(),
        "hash": hash_bytes(data.as_bytes()).to_string(),
        "url": format!("/files/{}", name),
      })
    })
    .collect();
  json!({ "version": version, "files": files }).to_string()
}
