//! Configuration for the application binary.
//!
//! Loads from a TOML file with built-in defaults; individual fields can be
//! overridden by CLI flags.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Update server base URL
    #[serde(default = "default_server_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Component name to look up in the manifest
    #[serde(default = "default_component")]
    pub component: String,

    /// How long the updater waits for this process to exit
    #[serde(default = "default_parent_exit_timeout_secs")]
    pub parent_exit_timeout_secs: u64,

    /// Arguments passed to the relaunched binary after a successful update
    #[serde(default = "default_restart_args")]
    pub restart_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_component() -> String {
    "hotswap".to_string()
}

fn default_parent_exit_timeout_secs() -> u64 {
    30
}

fn default_restart_args() -> Vec<String> {
    vec!["version".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            component: default_component(),
            parent_exit_timeout_secs: default_parent_exit_timeout_secs(),
            restart_args: default_restart_args(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            update: UpdateConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
