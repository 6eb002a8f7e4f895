//! Client configuration management.
//!
//! Handles loading, saving, and accessing the client configuration: the
//! server address used by the degraded HTTP channel, keep-alive cadence,
//! logging, and the application descriptor sent at registration.
//! Configuration is persisted as TOML on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{EwdError, EwdResult};

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Keep-alive settings.
    #[serde(default)]
    pub keep_alive: KeepAliveConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Application descriptor. Registration is impossible without one.
    #[serde(default)]
    pub application: Option<ApplicationConfig>,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// EWD.js back-end origin (e.g., "https://192.168.1.10:8080").
    #[serde(default)]
    pub address: String,

    /// Path of the degraded request/response endpoint.
    #[serde(default = "default_ajax_path")]
    pub ajax_path: String,

    /// Degraded-channel request timeout in milliseconds.
    #[serde(default = "default_ajax_timeout")]
    pub ajax_timeout_ms: u64,

    /// Custom HTTP headers as key-value pairs.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
}

/// Keep-alive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAliveConfig {
    /// Start the keep-alive automatically once registration completes.
    #[serde(default)]
    pub enabled: bool,

    /// Minutes between keep-alive messages.
    #[serde(default = "default_keep_alive_mins")]
    pub interval_mins: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, logs go to the console only.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

/// Application descriptor as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name; sent once with the first registration request.
    #[serde(default)]
    pub name: Option<String>,

    /// Presentation framework selector: "extjs", "bootstrap", or anything else.
    #[serde(default)]
    pub framework: Option<String>,

    /// Additional fields passed through in the registration descriptor.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// Default value functions for serde

fn default_ajax_path() -> String {
    constants::DEFAULT_AJAX_PATH.to_string()
}

fn default_ajax_timeout() -> u64 {
    constants::DEFAULT_AJAX_TIMEOUT_MS
}

fn default_keep_alive_mins() -> u64 {
    constants::DEFAULT_KEEP_ALIVE_MINS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            ajax_path: default_ajax_path(),
            ajax_timeout_ms: default_ajax_timeout(),
            custom_headers: HashMap::new(),
        }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_mins: default_keep_alive_mins(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl KeepAliveConfig {
    /// The keep-alive cadence as a duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_mins.max(1) * 60)
    }
}

impl ServerConfig {
    /// Full URL of the degraded endpoint.
    pub fn ajax_url(&self) -> EwdResult<String> {
        let origin = ClientConfig::sanitize_server_address(&self.address);
        if origin.is_empty() {
            return Err(EwdError::MissingConfig("server address".into()));
        }
        let path = if self.ajax_path.starts_with('/') {
            self.ajax_path.clone()
        } else {
            format!("/{}", self.ajax_path)
        };
        Ok(format!("{origin}{path}"))
    }
}

impl ClientConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> EwdResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> EwdResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> EwdResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| EwdError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    ///
    /// - Linux: `~/.config/ewd-client/config.toml`
    /// - macOS: `~/Library/Application Support/ewd-client/config.toml`
    /// - Windows: `%APPDATA%/ewd-client/config.toml`
    pub fn default_config_path() -> EwdResult<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| EwdError::Config("could not determine config directory".into()))?;
        Ok(base.join(constants::CLIENT_NAME).join("config.toml"))
    }

    /// Check whether the degraded HTTP channel can be used.
    pub fn is_server_configured(&self) -> bool {
        !self.server.address.trim().is_empty()
    }

    /// Sanitize and normalize a server address.
    ///
    /// Ensures the address has a scheme and strips trailing slashes.
    pub fn sanitize_server_address(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}
