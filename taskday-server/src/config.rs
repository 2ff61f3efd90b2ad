//! Configuration system for `taskday-server`.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskday-server/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use chrono::NaiveTime;

use crate::auth::UserEntry;

/// Errors that can occur when loading server configuration.
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

    /// `reset_at` is not a `HH:MM` or `HH:MM:SS` time of day.
    #[error("invalid reset time {0:?} (expected HH:MM)")]
    InvalidResetTime(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerConfigFile {
    server: ServerSection,
    reset: ResetSection,
    auth: AuthSection,
    storage: StorageSection,
    log: LogSection,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
}

/// `[reset]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ResetSection {
    at: Option<String>,
    token: Option<String>,
}

/// `[auth]` section holding the `[[auth.users]]` array.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthSection {
    users: Vec<UserEntry>,
}

/// `[storage]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageSection {
    path: Option<PathBuf>,
    in_memory: Option<bool>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LogSection {
    level: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "taskday record store server")]
pub struct ServerCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "TASKDAY_BIND")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/taskday-server/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum request frame size in bytes.
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// UTC time of day at which recurring tasks reset (HH:MM).
    #[arg(long, env = "TASKDAY_RESET_AT")]
    pub reset_at: Option<String>,

    /// Bearer token required by `POST /reset`.
    #[arg(long, env = "TASKDAY_RESET_TOKEN")]
    pub reset_token: Option<String>,

    /// JSON file the record tables are kept in
    /// (default: `<data dir>/taskday-server/tables.json`).
    #[arg(long, env = "TASKDAY_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Keep tables in memory only; everything is lost on exit.
    #[arg(long, conflicts_with = "data_file")]
    pub in_memory: bool,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "TASKDAY_LOG")]
    pub log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:9100`).
    pub bind_addr: String,
    /// Maximum accepted request frame size in bytes.
    pub max_payload_size: usize,
    /// UTC time of day of the daily recurring reset.
    pub reset_at: NaiveTime,
    /// Token `POST /reset` callers must present, if any.
    pub reset_token: Option<String>,
    /// Users allowed to connect.
    pub users: Vec<UserEntry>,
    /// Where the record tables are persisted; `None` keeps them in memory.
    pub data_file: Option<PathBuf>,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9100".to_string(),
            max_payload_size: 64 * 1024,
            reset_at: NaiveTime::default(),
            reset_token: None,
            users: Vec::new(),
            data_file: default_data_file(),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read or
    /// parsed, or if the reset time is malformed.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, file)
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &ServerCliArgs, file: ServerConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let reset_at = match cli.reset_at.as_deref().or(file.reset.at.as_deref()) {
            Some(s) => parse_time_of_day(s)?,
            None => defaults.reset_at,
        };

        let in_memory = cli.in_memory || (cli.data_file.is_none() && file.storage.in_memory == Some(true));
        let data_file = if in_memory {
            None
        } else {
            cli.data_file
                .clone()
                .or(file.storage.path)
                .or(defaults.data_file)
        };

        Ok(Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.server.bind_addr)
                .unwrap_or(defaults.bind_addr),
            max_payload_size: cli
                .max_payload_size
                .or(file.server.max_payload_size)
                .unwrap_or(defaults.max_payload_size),
            reset_at,
            reset_token: cli
                .reset_token
                .clone()
                .or(file.reset.token)
                .filter(|t| !t.is_empty()),
            users: file.auth.users,
            data_file,
            log_level: cli
                .log_level
                .clone()
                .or(file.log.level)
                .unwrap_or(defaults.log_level),
        })
    }
}

fn default_data_file() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("taskday-server").join("tables.json"))
}

fn parse_time_of_day(s: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidResetTime(s.to_string()))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ServerConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ServerConfigFile::default());
        };
        config_dir.join("taskday-server").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
