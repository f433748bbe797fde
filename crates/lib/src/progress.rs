//! Progress reporting.
//!
//! Long-running operations report through a [`ProgressSink`] rather than touching any UI. The
//! CLI hands in the sending half of an unbounded channel and renders events on its own task.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

/// Which part of a cycle an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
  Check,
  Update,
  Install,
}

impl std::fmt::Display for Phase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Phase::Check => write!(f, "check"),
      Phase::Update => write!(f, "update"),
      Phase::Install => write!(f, "install"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
  /// A human-readable status line.
  Status { phase: Phase, message: String },
  /// Overall completion, 0 to 100.
  Percent { phase: Phase, percent: f64 },
  /// Bytes received for a file since the previous event.
  Transferred { name: String, delta: u64 },
  /// The operation failed.
  Failed { message: String },
}

/// Receives progress events.
///
/// Implementations must not block: events are emitted from inside download loops.
pub trait ProgressSink: Send + Sync {
  fn emit(&self, event: ProgressEvent);

  fn status(&self, phase: Phase, message: impl Into<String>)
  where
    Self: Sized,
  {
    self.emit(ProgressEvent::Status {
      phase,
      message: message.into(),
    });
  }

  fn percent(&self, phase: Phase, percent: f64)
  where
    Self: Sized,
  {
    self.emit(ProgressEvent::Percent {
      phase,
      percent: percent.clamp(0.0, 100.0),
    });
  }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
  fn emit(&self, _event: ProgressEvent) {}
}

impl ProgressSink for UnboundedSender<ProgressEvent> {
  fn emit(&self, event: ProgressEvent) {
    // A closed receiver means nobody is watching anymore.
    let _ = self.send(event);
  }
}

impl<S: ProgressSink + ?Sized> ProgressSink for Arc<S> {
  fn emit(&self, event: ProgressEvent) {
    (**self).emit(event);
  }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &S {
  fn emit(&self, event: ProgressEvent) {
    (**self).emit(event);
  }
}
