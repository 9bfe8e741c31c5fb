//! Configuration loading for the dashboard sync engine
//!
//! Resolution priority for the configuration file:
//! 1. Explicit path passed by the embedding controller (highest priority)
//! 2. `LPD_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/lpd/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing file is not an error: the engine logs a warning and starts
//! with defaults. A file that exists but does not parse is an error.
//!
//! After the file is resolved, `LPD_API_BASE_URL` and `LPD_USER_ID`
//! override the corresponding keys.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "LPD_CONFIG";
/// Environment override for `api_base_url`
pub const API_BASE_URL_ENV_VAR: &str = "LPD_API_BASE_URL";
/// Environment override for `user_id`
pub const USER_ID_ENV_VAR: &str = "LPD_USER_ID";

/// Complete dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Base URL of the learning API server
    pub api_base_url: String,

    /// Catalog (manifest) endpoint path
    pub catalog_path: String,

    /// Selection store endpoint path
    pub selections_path: String,

    /// Change-notification (SSE) endpoint path
    pub events_path: String,

    /// User whose selections are loaded and persisted
    pub user_id: String,

    /// Open the change-notification listener after startup
    pub remote_sync: bool,

    /// Attach a checksum envelope to persisted selections and verify it on load
    pub integrity_mode: bool,

    /// Timeout applied to every HTTP request
    pub request_timeout_secs: u64,

    /// Broadcast buffer size of the event bus
    pub event_bus_capacity: usize,

    /// Selection persistence tuning
    pub selection: SelectionConfig,

    /// Change-listener reconnect tuning
    pub reconnect: ReconnectConfig,

    /// Progress calculation settings
    pub progress: ProgressConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Debounce and retry settings for selection writes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectionConfig {
    /// Quiet period collapsing a burst of toggles into one write
    pub debounce_ms: u64,
    /// Total write attempts before a storage error is surfaced
    pub retry_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt
    pub retry_base_delay_ms: u64,
}

/// Reconnect backoff for the change-notification listener
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect; doubles per attempt
    pub base_delay_ms: u64,
    /// Reconnect attempts before the listener goes offline
    pub max_attempts: u32,
}

/// Progress calculation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgressConfig {
    /// Milestone thresholds in percent, ascending
    pub milestones: Vec<u32>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3002".to_string(),
            catalog_path: "/api/learning/manifest".to_string(),
            selections_path: "/api/learning/selections".to_string(),
            events_path: "/api/progress/events".to_string(),
            user_id: "default-user".to_string(),
            remote_sync: true,
            integrity_mode: false,
            request_timeout_secs: 30,
            event_bus_capacity: 100,
            selection: SelectionConfig::default(),
            reconnect: ReconnectConfig::default(),
            progress: ProgressConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            retry_attempts: 3,
            retry_base_delay_ms: 100,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_attempts: 5,
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            milestones: vec![25, 50, 75],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl DashboardConfig {
    /// Resolve, load, override and validate the configuration
    ///
    /// # Arguments
    /// * `explicit_path` - File supplied by the embedding controller, if any
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(explicit_path) {
            Some(path) if path.exists() => {
                info!("Loading dashboard config from {}", path.display());
                Self::from_file(&path)?
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                warn!("No config file location available, using built-in defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without applying environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply `LPD_API_BASE_URL` and `LPD_USER_ID` when set and non-blank
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_blank_env(API_BASE_URL_ENV_VAR) {
            info!("api_base_url overridden from environment");
            self.api_base_url = url;
        }
        if let Some(user) = non_blank_env(USER_ID_ENV_VAR) {
            info!("user_id overridden from environment");
            self.user_id = user;
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(Error::Config("api_base_url must not be empty".to_string()));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::Config("user_id must not be empty".to_string()));
        }
        if self.selection.retry_attempts == 0 {
            return Err(Error::Config(
                "selection.retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.event_bus_capacity == 0 {
            return Err(Error::Config("event_bus_capacity must be at least 1".to_string()));
        }
        if let Some(bad) = self
            .progress
            .milestones
            .iter()
            .find(|m| **m == 0 || **m >= 100)
        {
            return Err(Error::Config(format!(
                "progress.milestones must lie strictly between 0 and 100 (got {})",
                bad
            )));
        }
        Ok(())
    }

    /// Full URL of the catalog endpoint
    pub fn catalog_url(&self) -> String {
        join_url(&self.api_base_url, &self.catalog_path)
    }

    /// Full URL of the selection endpoint
    pub fn selections_url(&self) -> String {
        join_url(&self.api_base_url, &self.selections_path)
    }

    /// Full URL of the change-notification stream
    pub fn events_url(&self) -> String {
        join_url(&self.api_base_url, &self.events_path)
    }
}

/// Write a configuration back to disk as TOML
pub fn write_config(config: &DashboardConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Pick the configuration file location by priority
fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Some(path) = non_blank_env(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    default_config_path()
}

/// Platform default location of the configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lpd").join("config.toml"))
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
