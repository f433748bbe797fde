//! Check command implementation.
//!
//! Runs the check half of an update cycle and reports what would change.

use anyhow::Result;

use upkeep_lib::update::{CheckOutcome, CheckReport, ManifestOrigin};

use crate::cmd::GlobalOpts;
use crate::output::{ProgressPrinter, format_bytes, print_json, print_stat, print_success, print_warning};

pub async fn cmd_check(opts: &GlobalOpts) -> Result<()> {
  let updater = opts.updater()?;

  let printer = ProgressPrinter::start(opts.output.is_json() || !opts.verbose);
  let result = updater.check(printer.sink()).await;
  printer.finish().await;
  let report = result?;

  if opts.output.is_json() {
    print_json(&report_json(&report))?;
  } else {
    print_report(&report, updater.config().installed_version.as_str());
  }
  Ok(())
}

pub(crate) fn origin_name(origin: ManifestOrigin) -> &'static str {
  match origin {
    ManifestOrigin::Remote => "remote",
    ManifestOrigin::FreshCache => "cache",
    ManifestOrigin::StaleCache => "stale-cache",
  }
}

pub(crate) fn report_json(report: &CheckReport) -> serde_json::Value {
  let (status, files, bytes, available) = match &report.outcome {
    CheckOutcome::UpToDate => ("up-to-date", 0, 0, None),
    CheckOutcome::UpdateAvailable { files, bytes } => ("update-available", *files, *bytes, None),
    CheckOutcome::FullUpgradeRequired { available } => ("upgrade-required", 0, 0, Some(available.clone())),
  };
  serde_json::json!({
    "status": status,
    "source": origin_name(report.origin),
    "version": report.version,
    "files": files,
    "bytes": bytes,
    "available": available,
  })
}

pub(crate) fn print_report(report: &CheckReport, installed: &str) {
  if report.origin == ManifestOrigin::StaleCache {
    print_warning("Update server unreachable; showing results from an expired cache");
  }

  match &report.outcome {
    CheckOutcome::UpToDate => print_success("Everything is up to date"),
    CheckOutcome::UpdateAvailable { files, bytes } => {
      print_warning(&format!("{} file(s) need updating ({})", files, format_bytes(*bytes)));
      println!("Run 'upkeep update' to apply.");
    }
    CheckOutcome::FullUpgradeRequired { available } => {
      print_warning(&format!("Version {} is available (installed: {})", available, installed));
      println!("Run 'upkeep install' to upgrade.");
    }
  }

  if let Some(version) = &report.version {
    print_stat("Remote version", version);
  }
  print_stat("Source", origin_name(report.origin));
}
