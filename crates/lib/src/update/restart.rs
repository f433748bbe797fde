//! Relaunching the application after an update.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use tracing::info;

/// Relaunches the updated executable.
///
/// Returned by a successful update; the caller decides whether (and when) to run it,
/// typically after asking the user and right before exiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartAction {
  executable: PathBuf,
  args: Vec<String>,
}

impl RestartAction {
  pub fn new(executable: impl Into<PathBuf>) -> Self {
    Self {
      executable: executable.into(),
      args: Vec::new(),
    }
  }

  pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
    self.args = args.into_iter().map(Into::into).collect();
    self
  }

  pub fn executable(&self) -> &Path {
    &self.executable
  }

  /// Start the executable detached from the current process's lifetime.
  pub fn launch(&self) -> io::Result<Child> {
    info!(executable = %self.executable.display(), "relaunching application");
    let mut command = Command::new(&self.executable);
    command.args(&self.args);
    if let Some(dir) = self.executable.parent().filter(|d| !d.as_os_str().is_empty()) {
      command.current_dir(dir);
    }
    command.spawn()
  }
}
