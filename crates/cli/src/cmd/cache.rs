//! Cache command implementations.

use anyhow::{Context, Result};
use chrono::Utc;

use upkeep_lib::cache::{CacheError, CacheStore, is_fresh};

use crate::cmd::GlobalOpts;
use crate::output::{format_bytes, print_info, print_json, print_stat, print_success, print_warning};

pub fn cmd_cache_show(opts: &GlobalOpts) -> Result<()> {
  let settings = opts.settings()?;
  let store = CacheStore::new(settings.cache_file()?);

  let record = match store.load() {
    Ok(record) => record,
    Err(CacheError::NotFound(_)) => {
      print_info("No cached manifest. Run 'upkeep check' to create one.");
      return Ok(());
    }
    Err(e) => return Err(e).context("Failed to read cache"),
  };

  let now = Utc::now();
  let fresh = is_fresh(&record, now, settings.freshness());
  let total: u64 = record.entries.iter().map(|e| e.size).sum();

  if opts.output.is_json() {
    print_json(&serde_json::json!({
      "path": store.path(),
      "version": record.version,
      "digest_kind": record.digest_kind.to_string(),
      "files": record.entries.len(),
      "bytes": total,
      "last_updated": record.last_updated,
      "fresh": fresh,
    }))?;
    return Ok(());
  }

  if fresh {
    print_success("Cached manifest is fresh");
  } else {
    print_warning("Cached manifest is stale");
  }
  print_stat("Path", &store.path().display().to_string());
  print_stat("Version", record.version.as_deref().unwrap_or("-"));
  print_stat("Digest", &record.digest_kind.to_string());
  print_stat("Files", &record.entries.len().to_string());
  print_stat("Size", &format_bytes(total));

  let age = (now - record.last_updated).to_std().unwrap_or_default();
  let age = humantime::format_duration(std::time::Duration::from_secs(age.as_secs()));
  print_stat("Last updated", &format!("{} ({} ago)", record.last_updated.to_rfc3339(), age));
  Ok(())
}

pub fn cmd_cache_clear(opts: &GlobalOpts) -> Result<()> {
  let settings = opts.settings()?;
  let store = CacheStore::new(settings.cache_file()?);
  store.invalidate().context("Failed to clear cache")?;
  print_success(&format!("Cleared {}", store.path().display()));
  Ok(())
}
