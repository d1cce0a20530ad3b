//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/pagepulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/pagepulse/` (~/.config/pagepulse/)
//! - Data: `$XDG_DATA_HOME/pagepulse/` (~/.local/share/pagepulse/)
//! - State/Logs: `$XDG_STATE_HOME/pagepulse/` (~/.local/state/pagepulse/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Tracker behaviour and collection endpoint
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Durable state location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tracker configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Collection endpoint that receives one POST per event
    pub endpoint: Option<String>,

    /// Sliding session lifetime in minutes
    #[serde(default = "default_session_duration_minutes")]
    pub session_duration_minutes: u64,

    /// How long `track_event` waits once for the session before dropping
    #[serde(default = "default_ready_grace_ms")]
    pub ready_grace_ms: u64,

    /// Upper bound on events buffered before the session is ready
    #[serde(default = "default_max_pending_events")]
    pub max_pending_events: usize,

    /// Upper bound on retained resource timing records
    #[serde(default = "default_max_resources")]
    pub max_resources: usize,

    /// Minimum interaction duration the host should report
    #[serde(default = "default_interaction_threshold_ms")]
    pub interaction_threshold_ms: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            session_duration_minutes: default_session_duration_minutes(),
            ready_grace_ms: default_ready_grace_ms(),
            max_pending_events: default_max_pending_events(),
            max_resources: default_max_resources(),
            interaction_threshold_ms: default_interaction_threshold_ms(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Longest accepted session lifetime: one year
pub const MAX_SESSION_DURATION_MINUTES: u64 = 365 * 24 * 60;

fn default_session_duration_minutes() -> u64 {
    30
}

fn default_ready_grace_ms() -> u64 {
    100
}

fn default_max_pending_events() -> usize {
    256
}

fn default_max_resources() -> usize {
    150
}

fn default_interaction_threshold_ms() -> u64 {
    40
}

fn default_request_timeout() -> u64 {
    10
}

impl TrackerConfig {
    /// Session lifetime in milliseconds, saturating for unvalidated values
    pub fn session_duration_ms(&self) -> i64 {
        i64::try_from(self.session_duration_minutes)
            .ok()
            .and_then(|minutes| minutes.checked_mul(60 * 1000))
            .unwrap_or(i64::MAX)
    }

    /// Refresh cadence: half the session lifetime
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis((self.session_duration_ms() / 2).max(1) as u64)
    }

    /// Grace period for `track_event`
    pub fn ready_grace(&self) -> Duration {
        Duration::from_millis(self.ready_grace_ms)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.session_duration_minutes == 0 {
            return Err(Error::Config(
                "tracker.session_duration_minutes must be greater than 0".to_string(),
            ));
        }
        if self.session_duration_minutes > MAX_SESSION_DURATION_MINUTES {
            return Err(Error::Config(format!(
                "tracker.session_duration_minutes must be at most {}",
                MAX_SESSION_DURATION_MINUTES
            )));
        }
        if self.max_pending_events == 0 {
            return Err(Error::Config(
                "tracker.max_pending_events must be greater than 0".to_string(),
            ));
        }
        if let Some(endpoint) = &self.endpoint {
            let parsed = url::Url::parse(endpoint)
                .map_err(|e| Error::Config(format!("invalid tracker.endpoint: {}", e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::Config(
                    "tracker.endpoint must be an http(s) URL".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Durable storage configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    /// Override path for the SQLite state file
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.tracker.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/pagepulse/config.toml` (~/.config/pagepulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("pagepulse").join("config.toml")
    }

    /// Returns the data directory path (for the state database)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("pagepulse")
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("pagepulse")
    }

    /// Returns the durable state file path, honouring `[storage] path`
    pub fn storage_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("state.db"))
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/pagepulse/pagepulse.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("pagepulse.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.tracker.endpoint.is_none());
        assert_eq!(config.tracker.session_duration_minutes, 30);
        assert_eq!(config.tracker.ready_grace_ms, 100);
        assert_eq!(config.tracker.max_resources, 150);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_refresh_interval_is_half_the_session() {
        let config = TrackerConfig::default();
        assert_eq!(config.session_duration_ms(), 30 * 60 * 1000);
        assert_eq!(config.refresh_interval(), Duration::from_secs(15 * 60));
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[tracker]
endpoint = "https://collect.example.com/e"
session_duration_minutes = 10
max_pending_events = 8

[storage]
path = "/tmp/pagepulse-state.db"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.tracker.endpoint.as_deref(),
            Some("https://collect.example.com/e")
        );
        assert_eq!(config.tracker.session_duration_minutes, 10);
        assert_eq!(config.tracker.max_pending_events, 8);
        assert_eq!(config.tracker.ready_grace_ms, 100);
        assert_eq!(
            config.storage_path(),
            PathBuf::from("/tmp/pagepulse-state.db")
        );
        assert_eq!(config.logging.level, "debug");
        assert!(config.tracker.validate().is_ok());
    }

    #[test]
    fn test_tracker_config_validation() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());

        let config = TrackerConfig {
            session_duration_minutes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrackerConfig {
            endpoint: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrackerConfig {
            endpoint: Some("ftp://collect.example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_duration_upper_bound() {
        let config = TrackerConfig {
            session_duration_minutes: MAX_SESSION_DURATION_MINUTES,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(
            config.session_duration_ms(),
            MAX_SESSION_DURATION_MINUTES as i64 * 60 * 1000
        );

        let config = TrackerConfig {
            session_duration_minutes: MAX_SESSION_DURATION_MINUTES + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrackerConfig {
            session_duration_minutes: u64::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.session_duration_ms(), i64::MAX);
        assert!(config.refresh_interval() > Duration::ZERO);
    }

    #[test]
    fn test_oversized_duration_in_file_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!(
                "[tracker]\nsession_duration_minutes = {}\n",
                i64::MAX
            ),
        )
        .unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("session_duration_minutes"));
    }
}
