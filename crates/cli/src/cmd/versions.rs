//! Versions command implementation.

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use crate::cmd::GlobalOpts;
use crate::output::{print_info, print_json, print_stat, symbols};

pub async fn cmd_versions(opts: &GlobalOpts) -> Result<()> {
  let (settings, client) = opts.client()?;
  let info = client.fetch_version_info().await?;

  if opts.output.is_json() {
    print_json(&info)?;
    return Ok(());
  }

  print_stat("Current", &info.current);
  if let Some(installed) = &settings.installed_version {
    print_stat("Installed", installed);
  }

  if info.versions.is_empty() {
    print_info("No versions published");
    return Ok(());
  }

  println!();
  for entry in &info.versions {
    let marker = if entry.version == info.current {
      symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.green()).to_string()
    } else {
      symbols::INFO.to_string()
    };
    if entry.release_date.is_empty() {
      println!("  {} {}", marker, entry.version);
    } else {
      println!("  {} {} ({})", marker, entry.version, entry.release_date);
    }
    if opts.verbose && !entry.notes.is_empty() {
      println!("      {}", entry.notes);
    }
  }
  Ok(())
}
