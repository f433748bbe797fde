mod cmd;
mod output;
mod prompts;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::GlobalOpts;
use crate::output::{OutputFormat, print_error};

/// upkeep - keep an application install in sync with its update server
#[derive(Parser)]
#[command(name = "upkeep")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the settings file (default: $UPKEEP_CONFIG, ./upkeep.toml, then the config dir)
  #[arg(long, global = true, value_name = "PATH")]
  config: Option<PathBuf>,

  /// Update backend base URL, overriding the configured source
  #[arg(long, global = true, value_name = "URL")]
  backend: Option<String>,

  /// Install directory, overriding the configured one
  #[arg(long, global = true, value_name = "DIR")]
  install_dir: Option<PathBuf>,

  /// Installed application version, overriding the configured one
  #[arg(long, global = true, value_name = "VERSION")]
  installed_version: Option<String>,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Check whether updates are available
  Check,

  /// Download changed files and replace them in place
  Update {
    /// Apply without asking for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Relaunch the application after a successful update
    #[arg(long)]
    restart: bool,
  },

  /// Replace the whole installation with the latest package
  Install {
    /// Install without asking for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Relaunch the application after a successful install
    #[arg(long)]
    restart: bool,
  },

  /// Show the versions published by the backend
  Versions,

  /// Inspect or clear the cached manifest
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand)]
enum CacheAction {
  /// Show the cached manifest
  Show,
  /// Delete the cached manifest
  Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let opts = GlobalOpts {
    config: cli.config,
    backend: cli.backend,
    install_dir: cli.install_dir,
    installed_version: cli.installed_version,
    output: cli.output,
    verbose: cli.verbose,
  };

  let result = match cli.command {
    Commands::Check => cmd::cmd_check(&opts).await,
    Commands::Update { yes, restart } => cmd::cmd_update(&opts, yes, restart).await,
    Commands::Install { yes, restart } => cmd::cmd_install(&opts, yes, restart).await,
    Commands::Versions => cmd::cmd_versions(&opts).await,
    Commands::Cache { action } => match action {
      CacheAction::Show => cmd::cmd_cache_show(&opts),
      CacheAction::Clear => cmd::cmd_cache_clear(&opts),
    },
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
