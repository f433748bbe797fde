//! Constants shared across the crate.

/// Application name used for config and data directories.
pub const APP_NAME: &str = "upkeep";

/// Settings file name, looked up in the working directory and the config directory.
pub const SETTINGS_FILENAME: &str = "upkeep.toml";

/// Environment variable overriding the settings file location.
pub const SETTINGS_ENV_VAR: &str = "UPKEEP_CONFIG";

/// Cache file name, stored beside the installed binary.
pub const CACHE_FILENAME: &str = "update_cache.json";

/// Suffix appended to a file path to form its single-file backup.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Default freshness window for the cached manifest, in seconds.
pub const DEFAULT_FRESHNESS_SECS: u64 = 3600;

/// Default number of transport attempts per file or package.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed wait after a rate-limit response, in seconds.
pub const DEFAULT_RATE_LIMIT_DELAY_SECS: u64 = 1;

/// Default connect timeout for HTTP requests, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default overall timeout for HTTP requests, in seconds.
///
/// Sized for the bulk package download, the largest single request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// User agent sent with every request. Source-hosting APIs reject requests without one.
pub const USER_AGENT: &str = concat!("upkeep/", env!("CARGO_PKG_VERSION"));

/// Default API base of the source-hosting service.
pub const DEFAULT_REPOSITORY_API_URL: &str = "https://api.github.com";

/// Default raw-content host of the source-hosting service.
pub const DEFAULT_REPOSITORY_RAW_URL: &str = "https://raw.githubusercontent.com";

/// Default release download base of the source-hosting service.
pub const DEFAULT_REPOSITORY_RELEASE_URL: &str = "https://github.com";

/// Default branch listed by the repository source.
pub const DEFAULT_BRANCH: &str = "main";
