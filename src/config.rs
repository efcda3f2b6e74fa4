// Configuration File Support
//
// TOML configuration with environment variable overrides.
// Configuration files are loaded from XDG config directory: ~/.config/lxd-driver/config.toml

use crate::lxd::client::DEFAULT_SOCKET;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// LXD connection configuration
    pub lxd: LxdConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// LXD connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LxdConfig {
    /// Path of the local LXD socket
    pub socket_path: String,

    /// HTTPS URL of a remote LXD host; the socket is ignored when set
    pub remote_url: Option<String>,

    /// Verify the remote host certificate
    pub verify_tls: bool,

    /// Timeout passed to LXD with container state changes (-1 = no limit)
    pub timeout: i32,

    /// Client-side timeout in seconds for requests that are not operation waits
    pub request_timeout_secs: u64,
}

impl Default for LxdConfig {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_SOCKET.to_string(),
            remote_url: None,
            verify_tls: true,
            timeout: -1,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation. A missing file yields the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/lxd-driver/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("org", "lxd-driver", "lxd-driver") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("lxd-driver")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// - LXD_DRIVER_LOG_LEVEL
    /// - LXD_DRIVER_LOG_FORMAT
    /// - LXD_DRIVER_SOCKET
    /// - LXD_DRIVER_REMOTE_URL
    /// - LXD_DRIVER_TIMEOUT
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("LXD_DRIVER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LXD_DRIVER_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(socket) = std::env::var("LXD_DRIVER_SOCKET") {
            self.lxd.socket_path = socket;
        }
        if let Ok(url) = std::env::var("LXD_DRIVER_REMOTE_URL") {
            self.lxd.remote_url = Some(url);
        }
        if let Ok(timeout) = std::env::var("LXD_DRIVER_TIMEOUT") {
            if let Ok(timeout) = timeout.parse::<i32>() {
                if timeout >= -1 {
                    self.lxd.timeout = timeout;
                }
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        if self.lxd.timeout < -1 {
            anyhow::bail!("LXD timeout must be -1 (no limit) or a number of seconds");
        }
        if self.lxd.request_timeout_secs == 0 {
            anyhow::bail!("LXD request timeout must be > 0");
        }
        if let Some(url) = &self.lxd.remote_url {
            if !url.starts_with("https://") {
                anyhow::bail!("Remote LXD URL must use https: {}", url);
            }
        } else if self.lxd.socket_path.is_empty() {
            anyhow::bail!("LXD socket path must not be empty");
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
