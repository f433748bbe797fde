//! upkeep-lib: reconciliation engine for self-updating applications
//!
//! This crate keeps an install directory in line with a remotely published manifest:
//! - `manifest`: fetches the server-declared file list from a backend or a repository
//! - `cache`: persists the last manifest with a freshness window
//! - `plan`: decides which local files are missing or stale
//! - `fetch`: downloads files with retries, rate-limit fallback and `.bak` backups
//! - `install`: replaces a whole installation from a package archive
//! - `update`: the state machine tying the above together

pub mod cache;
pub mod config;
pub mod consts;
pub mod fetch;
pub mod install;
pub mod manifest;
pub mod plan;
pub mod platform;
pub mod progress;
pub mod transport;
pub mod update;
pub mod util;
