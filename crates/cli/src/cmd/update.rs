//! Update command implementation.
//!
//! Checks for stale files, lists them, asks for confirmation and replaces them in place.

use std::time::Instant;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use upkeep_lib::plan::{StaleReason, UpdatePlan};
use upkeep_lib::update::{CheckOutcome, UpdateState};

use crate::cmd::check::{print_report, report_json};
use crate::cmd::{GlobalOpts, cancel_on_ctrl_c, report_outcome};
use crate::output::{ProgressPrinter, format_bytes, print_info, print_json, symbols, truncate_hash};
use crate::prompts::confirm;

pub async fn cmd_update(opts: &GlobalOpts, yes: bool, restart: bool) -> Result<()> {
  let updater = opts.updater()?;
  let quiet = opts.output.is_json();

  let printer = ProgressPrinter::start(quiet || !opts.verbose);
  let result = updater.check(printer.sink()).await;
  printer.finish().await;
  let report = result?;

  let plan = match (&report.outcome, updater.state()) {
    (CheckOutcome::UpdateAvailable { .. }, UpdateState::AwaitingConfirmation { plan, .. }) => plan,
    _ => {
      if quiet {
        print_json(&report_json(&report))?;
      } else {
        print_report(&report, updater.config().installed_version.as_str());
      }
      return Ok(());
    }
  };

  if !quiet {
    print_plan(&plan, opts.verbose);
  }

  let message = format!("Update {} file(s) ({})?", plan.len(), format_bytes(plan.total_size()));
  if !confirm(&message, yes)? {
    print_info("Update cancelled");
    return Ok(());
  }

  let cancel = cancel_on_ctrl_c();
  let started = Instant::now();
  let printer = ProgressPrinter::start(quiet);
  let result = updater.apply(printer.sink(), &cancel).await;
  let transferred = printer.finish().await;

  report_outcome(opts, result?, transferred, started.elapsed(), restart)
}

fn print_plan(plan: &UpdatePlan, verbose: bool) {
  println!("Files to update:");
  for file in &plan.files {
    let symbol = match file.reason {
      StaleReason::Missing => symbols::ADD.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
      StaleReason::Changed | StaleReason::Directory => {
        symbols::MODIFY.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string()
      }
    };
    if verbose {
      println!(
        "  {} {} ({}, {}, {})",
        symbol,
        file.entry.name,
        file.reason,
        format_bytes(file.entry.size),
        truncate_hash(file.entry.digest.as_hex())
      );
    } else {
      println!("  {} {} ({})", symbol, file.entry.name, format_bytes(file.entry.size));
    }
  }
  println!();
}
