//! Retry policy and cancellable waits.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::consts::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RATE_LIMIT_DELAY_SECS};

/// How long to wait after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
  /// `unit * attempt`.
  Linear { unit: Duration },
  /// `base * 2^attempt`.
  Exponential { base: Duration },
}

impl Backoff {
  /// Delay after failed attempt number `attempt` (1-based). Non-decreasing in `attempt`.
  pub fn delay(&self, attempt: u32) -> Duration {
    match *self {
      Backoff::Linear { unit } => unit.saturating_mul(attempt),
      Backoff::Exponential { base } => base.saturating_mul(1u32 << attempt.min(20)),
    }
  }
}

impl Default for Backoff {
  fn default() -> Self {
    Backoff::Linear {
      unit: Duration::from_secs(1),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Upper bound on transport calls per file.
  pub max_attempts: u32,
  pub backoff: Backoff,
  /// Wait after a rate-limited attempt, before switching to the fallback route.
  pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: DEFAULT_MAX_ATTEMPTS,
      backoff: Backoff::default(),
      rate_limit_delay: Duration::from_secs(DEFAULT_RATE_LIMIT_DELAY_SECS),
    }
  }
}

impl RetryPolicy {
  /// A policy that retries without waiting.
  pub fn immediate(max_attempts: u32) -> Self {
    Self {
      max_attempts,
      backoff: Backoff::Linear { unit: Duration::ZERO },
      rate_limit_delay: Duration::ZERO,
    }
  }

  /// `max_attempts`, never less than one.
  pub fn attempts(&self) -> u32 {
    self.max_attempts.max(1)
  }
}

/// Sleep for `delay` unless `cancel` fires first. Returns `false` when cancelled.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
  if cancel.is_cancelled() {
    return false;
  }
  if delay.is_zero() {
    return true;
  }
  tokio::select! {
    _ = cancel.cancelled() => false,
    _ = tokio::time::sleep(delay) => true,
  }
}
