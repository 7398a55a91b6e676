//! Configuration module for feedwatch.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::{FeedwatchError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/feedwatch.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedwatch.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Poll loop timing.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Sleep between two poll cycles, in seconds.
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    /// Sleep after a cycle-fatal failure, in seconds.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

fn default_poll_interval() -> u64 {
    300 // 5 minutes
}

fn default_cooldown() -> u64 {
    900 // 15 minutes
}

impl PollConfig {
    /// Normal cadence between cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Cooldown after a failed cycle.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            cooldown_secs: default_cooldown(),
        }
    }
}

/// Feed fetching configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Allow feeds on loopback/private hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            allow_private_hosts: false,
        }
    }
}

/// Notification configuration.
///
/// When `smtp_host` is empty, notifications are written to the log instead
/// of being mailed.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Mail recipient.
    #[serde(default)]
    pub recipient: String,
    /// Mail sender.
    #[serde(default)]
    pub sender: String,
    /// SMTP relay host.
    #[serde(default)]
    pub smtp_host: String,
    /// SMTP port (implicit TLS).
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP user name.
    #[serde(default)]
    pub smtp_username: String,
    /// SMTP password.
    #[serde(default)]
    pub smtp_password: String,
}

fn default_smtp_port() -> u16 {
    465
}

impl NotifyConfig {
    /// Whether an SMTP relay is configured.
    pub fn smtp_enabled(&self) -> bool {
        !self.smtp_host.is_empty()
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            sender: String::new(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
        }
    }
}

/// A feed registered at startup.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    /// Unique display name.
    pub name: String,
    /// Feed URL.
    pub url: String,
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Poll loop configuration.
    #[serde(default)]
    pub poll: PollConfig,
    /// Feed fetching configuration.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Notification configuration.
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Feeds to register at startup.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FeedwatchError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FeedwatchError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDWATCH_SMTP_USERNAME`: Override the SMTP user name
    /// - `FEEDWATCH_SMTP_PASSWORD`: Override the SMTP password
    pub fn apply_env_overrides(&mut self) {
        if let Some(user) = non_empty_env("FEEDWATCH_SMTP_USERNAME") {
            self.notify.smtp_username = user;
        }
        if let Some(password) = non_empty_env("FEEDWATCH_SMTP_PASSWORD") {
            self.notify.smtp_password = password;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_secs == 0 {
            return Err(FeedwatchError::Config(
                "poll.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.poll.cooldown_secs == 0 {
            return Err(FeedwatchError::Config(
                "poll.cooldown_secs must be greater than zero".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() || source.url.trim().is_empty() {
                return Err(FeedwatchError::Config(
                    "every [[sources]] entry needs a name and a url".to_string(),
                ));
            }
            if !names.insert(source.name.as_str()) {
                return Err(FeedwatchError::Config(format!(
                    "duplicate source name: {}",
                    source.name
                )));
            }
        }

        if self.notify.smtp_enabled()
            && (self.notify.sender.is_empty() || self.notify.recipient.is_empty())
        {
            return Err(FeedwatchError::Config(
                "notify.smtp_host is set but sender or recipient is missing".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
