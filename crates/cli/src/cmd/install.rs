//! Install command implementation.

use std::time::Instant;

use anyhow::Result;

use crate::cmd::{GlobalOpts, cancel_on_ctrl_c, report_outcome};
use crate::output::{ProgressPrinter, print_info};
use crate::prompts::confirm;

pub async fn cmd_install(opts: &GlobalOpts, yes: bool, restart: bool) -> Result<()> {
  let updater = opts.updater()?;
  let install_dir = updater.config().install_dir.display().to_string();

  if !confirm(&format!("Replace the installation in {}?", install_dir), yes)? {
    print_info("Install cancelled");
    return Ok(());
  }

  let cancel = cancel_on_ctrl_c();
  let started = Instant::now();
  let printer = ProgressPrinter::start(opts.output.is_json());
  let result = updater.install_package(printer.sink(), &cancel).await;
  let transferred = printer.finish().await;

  report_outcome(opts, result?, transferred, started.elapsed(), restart)
}
