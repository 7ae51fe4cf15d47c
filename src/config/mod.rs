//! Configuration types and loading for the resolver.

use crate::error::{ResolvError, Result};
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default stubresolv.yaml embedded at compile time
pub const DEFAULT_CONFIG_YAML: &str = include_str!("../../stubresolv.yaml");

/// Well-known DNS port, used when the server address has none
pub const DNS_SERVER_PORT: u16 = 53;

/// Main configuration struct
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            resolver: ResolverConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Parse `server` as `ip:port` or a bare IP (port 53)
    pub fn server_addr(&self) -> Result<SocketAddr> {
        parse_server_addr(&self.server)
    }
}

/// Parse a DNS server address, defaulting the port to 53
pub fn parse_server_addr(value: &str) -> Result<SocketAddr> {
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    value
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_SERVER_PORT))
        .map_err(|_| ResolvError::Config(format!("invalid DNS server address: {}", value)))
}

pub fn default_server() -> String {
    "8.8.8.8:53".to_string()
}

// ============== Resolver Config ==============

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ResolverConfig {
    /// Attempt budget of a table entry
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Ticks an entry waits before its query is re-sent
    #[serde(default = "default_retry_interval_ticks")]
    pub retry_interval_ticks: u8,
    /// Period of the table driver loop
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Poll attempts of a synchronous query
    #[serde(default = "default_query_attempts")]
    pub query_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_retries() -> u8 {
    8
}

fn default_retry_interval_ticks() -> u8 {
    1
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_query_attempts() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    200 // 10 x 200ms = 2s per synchronous query
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            max_retries: default_max_retries(),
            retry_interval_ticks: default_retry_interval_ticks(),
            tick_interval_ms: default_tick_interval_ms(),
            query_attempts: default_query_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ResolverConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Total wait budget of a synchronous query, saturating on overflow
    pub fn query_budget(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
            .checked_mul(self.query_attempts)
            .unwrap_or(Duration::MAX)
    }
}

// ============== Logging Config ==============

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub format: LogFormat,
    /// File logging configuration
    #[serde(default)]
    pub file: Option<FileLoggingConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FileLoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
    #[serde(default)]
    pub rotation: LogRotation,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_file_prefix() -> String {
    "stubresolv.log".to_string()
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        FileLoggingConfig {
            log_dir: default_log_dir(),
            file_prefix: default_log_file_prefix(),
            rotation: LogRotation::Daily,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            enabled: default_logging_enabled(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

// ============== Config Loading ==============

/// Get the directory containing the executable
fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

/// Parse configuration from YAML text
pub fn parse_config(yaml: &str) -> Result<Config> {
    serde_yaml_ng::from_str(yaml).map_err(|e| ResolvError::Config(e.to_string()))
}

/// Load configuration from file, falling back to defaults if none is found
pub fn load_config(path: Option<&str>) -> Result<Config> {
    let config_paths = if let Some(p) = path {
        vec![PathBuf::from(p)]
    } else {
        let mut paths = vec![PathBuf::from("stubresolv.yaml")];
        if let Some(dir) = exe_dir() {
            paths.push(dir.join("stubresolv.yaml"));
        }
        paths
    };

    for config_path in config_paths {
        if config_path.exists() {
            tracing::debug!(path = %config_path.display(), "Loading config");
            let content = fs::read_to_string(&config_path)?;
            return parse_config(&content);
        }
    }

    if let Some(p) = path {
        return Err(ResolvError::Config(format!("config file not found: {}", p)));
    }

    Ok(Config::default())
}

// ============== Unit Tests ==============
