//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, human-readable byte/duration formatting, and progress rendering.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use upkeep_lib::progress::ProgressEvent;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const ADD: &str = "+";
  pub const MODIFY: &str = "~";
}

pub fn truncate_hash(hash: &str) -> &str {
  let len = hash.len().min(12);
  &hash[..len]
}

pub fn format_bytes(bytes: u64) -> String {
  const KB: u64 = 1024;
  const MB: u64 = KB * 1024;
  const GB: u64 = MB * 1024;

  if bytes >= GB {
    format!("{:.1} GB", bytes as f64 / GB as f64)
  } else if bytes >= MB {
    format!("{:.1} MB", bytes as f64 / MB as f64)
  } else if bytes >= KB {
    format!("{:.1} KB", bytes as f64 / KB as f64)
  } else {
    format!("{} B", bytes)
  }
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Renders progress events on stderr while an operation runs.
pub struct ProgressPrinter {
  sink: UnboundedSender<ProgressEvent>,
  handle: JoinHandle<u64>,
}

impl ProgressPrinter {
  /// Start rendering. With `quiet`, events are consumed but nothing is printed.
  pub fn start(quiet: bool) -> Self {
    let (sink, rx) = unbounded_channel();
    let handle = tokio::spawn(render(rx, quiet));
    Self { sink, handle }
  }

  pub fn sink(&self) -> &UnboundedSender<ProgressEvent> {
    &self.sink
  }

  /// Stop rendering once every pending event is printed. Returns the bytes transferred.
  pub async fn finish(self) -> u64 {
    drop(self.sink);
    self.handle.await.unwrap_or(0)
  }
}

async fn render(mut rx: UnboundedReceiver<ProgressEvent>, quiet: bool) -> u64 {
  let mut transferred = 0;
  let mut last_percent: Option<u64> = None;

  while let Some(event) = rx.recv().await {
    match event {
      ProgressEvent::Status { message, .. } if !quiet => {
        eprintln!(
          "{} {}",
          symbols::ARROW.if_supports_color(Stream::Stderr, |s| s.cyan()),
          message
        );
      }
      ProgressEvent::Percent { phase, percent } if !quiet => {
        let rounded = percent.round() as u64;
        // Every 10%, plus completion.
        let due = match last_percent {
          None => true,
          Some(last) => rounded >= last + 10 || (rounded == 100 && last < 100),
        };
        if due {
          last_percent = Some(rounded);
          eprintln!(
            "  {} {:>3}%",
            phase.if_supports_color(Stream::Stderr, |s| s.dimmed()),
            rounded
          );
        }
      }
      ProgressEvent::Transferred { delta, .. } => transferred += delta,
      // Failures are reported once, by the command's error.
      _ => {}
    }
  }

  transferred
}
