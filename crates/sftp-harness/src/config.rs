//! Configuration for the harness server

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Harness server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: loopback only; this is a test fixture)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port; 0 asks the OS for an ephemeral port
    #[serde(default)]
    pub port: u16,

    /// Root directory served to clients; unset means the server creates and
    /// owns a temporary directory for its lifetime
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Host key path; generated on first use and reused across runs
    #[serde(default = "default_host_key_path")]
    pub host_key_path: PathBuf,

    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// SSH inactivity timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (text or json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text logging for human readability
    Text,
    /// JSON structured logging for log aggregators
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: 0,
            root_dir: None,
            host_key_path: default_host_key_path(),
            backlog: default_backlog(),
            timeout: default_timeout(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("failed to parse config: {e}")))
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(root_dir) = &self.root_dir {
            if !root_dir.exists() {
                return Err(crate::Error::Config(format!(
                    "root directory does not exist: {root_dir:?}"
                )));
            }

            if !root_dir.is_dir() {
                return Err(crate::Error::Config(format!(
                    "root path is not a directory: {root_dir:?}"
                )));
            }
        }

        Ok(())
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_host_key_path() -> PathBuf {
    std::env::temp_dir().join("sftp-harness-key.pem")
}

fn default_backlog() -> u32 {
    10
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}
