//! Configuration system for the `taskday` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskday/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Local, Offset};

use crate::report::ReportCaps;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The server URL is malformed or not a WebSocket URL.
    #[error("invalid server url {url}: {reason}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The UTC offset is outside ±24 hours.
    #[error("invalid utc offset: {0} minutes")]
    InvalidOffset(i32),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    tasks: TasksFileConfig,
    reports: ReportsFileConfig,
    log: LogFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    url: Option<String>,
    token: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// `[tasks]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TasksFileConfig {
    utc_offset_minutes: Option<i32>,
    max_title_len: Option<usize>,
}

/// `[reports]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReportsFileConfig {
    weekly_cap: Option<u64>,
    monthly_cap: Option<u64>,
}

/// `[log]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LogFileConfig {
    level: Option<String>,
    file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Store server WebSocket URL.
    pub server_url: Option<String>,
    /// Bearer token identifying the user to the server.
    pub token: Option<String>,
    /// Timeout for a single store request.
    pub request_timeout: Duration,
    /// Viewer's offset from UTC, used for calendar-day boundaries.
    pub utc_offset: FixedOffset,
    /// Maximum task title length in characters.
    pub max_title_len: usize,
    /// Reference caps for report normalization.
    pub report_caps: ReportCaps,
    /// Log level filter.
    pub log_level: String,
    /// Log file path (default: `$TMPDIR/taskday.log`).
    pub log_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            token: None,
            request_timeout: Duration::from_secs(10),
            utc_offset: Local::now().offset().fix(),
            max_title_len: 256,
            report_caps: ReportCaps::default(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if a resolved value is invalid.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server_url = cli
            .server_url
            .clone()
            .or_else(|| file.server.url.clone());
        if let Some(url) = &server_url {
            validate_server_url(url)?;
        }

        let utc_offset = match cli.utc_offset_minutes.or(file.tasks.utc_offset_minutes) {
            Some(minutes) => FixedOffset::east_opt(minutes.saturating_mul(60))
                .ok_or(ConfigError::InvalidOffset(minutes))?,
            None => defaults.utc_offset,
        };

        Ok(Self {
            server_url,
            token: cli.token.clone().or_else(|| file.server.token.clone()),
            request_timeout: file
                .server
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            utc_offset,
            max_title_len: file
                .tasks
                .max_title_len
                .unwrap_or(defaults.max_title_len),
            report_caps: ReportCaps {
                weekly: file
                    .reports
                    .weekly_cap
                    .unwrap_or(defaults.report_caps.weekly),
                monthly: file
                    .reports
                    .monthly_cap
                    .unwrap_or(defaults.report_caps.monthly),
            },
            log_level: cli
                .log_level
                .clone()
                .or_else(|| file.log.level.clone())
                .unwrap_or(defaults.log_level),
            log_file: cli.log_file.clone().or_else(|| file.log.file.clone()),
        })
    }
}

/// Global CLI arguments shared by every subcommand.
#[derive(clap::Args, Debug, Default)]
pub struct CliArgs {
    /// WebSocket URL of the taskday server.
    #[arg(long, env = "TASKDAY_SERVER_URL", global = true)]
    pub server_url: Option<String>,

    /// Bearer token for the taskday server.
    #[arg(long, env = "TASKDAY_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Offset from UTC in minutes used for calendar days (default: system).
    #[arg(long, env = "TASKDAY_UTC_OFFSET", global = true, allow_hyphen_values = true)]
    pub utc_offset_minutes: Option<i32>,

    /// Path to config file (default: `~/.config/taskday/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "TASKDAY_LOG", global = true)]
    pub log_level: Option<String>,

    /// Path to log file (default: `$TMPDIR/taskday.log`).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_server_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(invalid(format!("scheme must be ws or wss, got {other}"))),
    }
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskday").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
