use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RegistryConfig {
    #[serde(default = "default_base_url")]
    #[validate(url)]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    #[validate(length(min = 1))]
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

/// Rolling log files written next to the stdout log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LoggingConfig {
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Log files older than this many days are removed at startup.
    #[serde(default = "default_log_retention")]
    #[validate(range(min = 1, max = 365))]
    pub retention_days: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            dir: default_log_dir(),
            retention_days: default_log_retention(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_refresh_ahead"))]
pub struct CheckerConfig {
    #[serde(default = "default_listen")]
    #[validate(length(min = 1))]
    pub listen: String,

    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Age up to which a stored result is served without asking the registry.
    #[serde(default = "default_freshness")]
    #[validate(range(min = 1))]
    pub freshness_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    #[validate(range(min = 1, max = 120))]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_history_limit")]
    #[validate(range(min = 1, max = 1000))]
    pub history_limit: u32,

    /// Fresh hits older than this trigger a background re-fetch.
    #[serde(default)]
    pub refresh_ahead_secs: Option<u64>,

    #[serde(default)]
    #[validate(nested)]
    pub registry: RegistryConfig,

    #[serde(default)]
    #[validate(nested)]
    pub logging: LoggingConfig,

    /// Optional path to a parent configuration file to inherit from
    #[serde(default)]
    pub extends: Option<String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            database_path: default_database_path(),
            freshness_secs: default_freshness(),
            fetch_timeout_secs: default_fetch_timeout(),
            history_limit: default_history_limit(),
            refresh_ahead_secs: None,
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
            extends: None,
        }
    }
}

impl CheckerConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn refresh_ahead(&self) -> Option<Duration> {
        self.refresh_ahead_secs.map(Duration::from_secs)
    }
}

fn validate_refresh_ahead(config: &CheckerConfig) -> Result<(), validator::ValidationError> {
    match config.refresh_ahead_secs {
        Some(secs) if secs >= config.freshness_secs => Err(validator::ValidationError::new(
            "refresh_ahead_secs must be shorter than freshness_secs",
        )),
        _ => Ok(()),
    }
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("nic_domains.db")
}

fn default_freshness() -> u64 {
    3600
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_history_limit() -> u32 {
    100
}

fn default_base_url() -> String {
    "https://nic.ar/".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention() -> u64 {
    7
}
