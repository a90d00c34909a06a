//! Configuration schema and loading.
//!
//! Priority, highest first:
//! 1. Environment variables (`BOT_TOKEN`, `ORIGINAL_ADMIN_ID`, `PORT`,
//!    `PAGEBINDER_DB_PATH`)
//! 2. Explicit config file values (`~/.pagebinder/config.toml`)
//! 3. Default values

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".pagebinder"),
        |dirs| dirs.home_dir().join(".pagebinder"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = config_path();
        let path = path.unwrap_or(&default_path);

        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("failed to parse config file {}", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file {}", path.display()))
            }
        };

        config.apply_overrides(EnvOverrides::from_env());
        Ok(config)
    }

    fn apply_overrides(&mut self, overrides: EnvOverrides) {
        if let Some(token) = overrides.bot_token {
            self.bot.token = token;
        }
        if let Some(id) = overrides.original_admin_id {
            self.bot.original_admin_id = id;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(db_path) = overrides.db_path {
            self.directory.db_path = db_path;
        }
    }

    /// Directory database path with `~` expanded.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.directory.db_path).into_owned())
    }

    /// Scratch directory for per-run temporary artifacts.
    pub fn work_dir(&self) -> PathBuf {
        match &self.pipeline.work_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
            None => std::env::temp_dir().join("pagebinder"),
        }
    }
}

/// Environment overrides, collected separately so tests can apply them
/// without touching process state.
#[derive(Debug, Default)]
struct EnvOverrides {
    bot_token: Option<String>,
    original_admin_id: Option<String>,
    port: Option<u16>,
    db_path: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            bot_token: std::env::var("BOT_TOKEN").ok(),
            original_admin_id: std::env::var("ORIGINAL_ADMIN_ID").ok(),
            port: std::env::var("PORT").ok().and_then(|p| p.parse().ok()),
            db_path: std::env::var("PAGEBINDER_DB_PATH").ok(),
        }
    }
}

// ============================================================================
// BotConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Telegram bot token.
    #[serde(default)]
    pub token: String,
    /// User id of the bootstrap admin; the only id allowed to manage admins.
    #[serde(default)]
    pub original_admin_id: String,
    /// Seconds a dialog may sit idle before it is abandoned.
    #[serde(default = "default_dialog_timeout")]
    pub dialog_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            original_admin_id: String::new(),
            dialog_timeout_secs: default_dialog_timeout(),
        }
    }
}

fn default_dialog_timeout() -> u64 {
    60
}

// ============================================================================
// DirectoryConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.pagebinder/admins.db".to_string()
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

// ============================================================================
// PipelineConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum seconds to wait for page navigation.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
    /// Base filename used when the user declines renaming.
    #[serde(default = "default_output_name")]
    pub default_output_name: String,
    /// User-Agent header sent with image downloads.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Scratch directory for temporary artifacts; system temp dir when unset.
    #[serde(default)]
    pub work_dir: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: default_navigation_timeout(),
            default_output_name: default_output_name(),
            user_agent: default_user_agent(),
            work_dir: None,
        }
    }
}

fn default_navigation_timeout() -> u64 {
    120
}

fn default_output_name() -> String {
    "images".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/58.0.3029.110 Safari/537.3"
        .to_string()
}

// ============================================================================
// ObservabilityConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// Tests
// ============================================================================
