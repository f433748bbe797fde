//! Shared fixtures for library tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use upkeep_lib::fetch::RetryPolicy;
use upkeep_lib::transport::ReqwestTransport;
use upkeep_lib::update::UpdaterConfig;
use upkeep_lib::util::hash::hash_bytes;

pub fn transport() -> Arc<ReqwestTransport> {
  Arc::new(ReqwestTransport::new(Duration::from_secs(5), Duration::from_secs(10)).unwrap())
}

/// Updater settings with retries that never sleep.
pub fn config(install_dir: &Path, installed_version: &str) -> UpdaterConfig {
  let mut config = UpdaterConfig::new(installed_version, install_dir);
  config.retry = RetryPolicy::immediate(3);
  config
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
