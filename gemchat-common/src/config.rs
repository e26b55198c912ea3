//! Configuration management for gemchat.
//!
//! The gateway reads an optional JSON file at `~/.gemchat/config.json`
//! (or the path in `GEMCHAT_CONFIG`), then applies environment overrides.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Network
//! - `PORT` → network.port
//! - `GEMCHAT_BIND_ADDRESS` → network.bind
//!
//! ## Model
//! - `GOOGLE_API_KEY` / `GEMINI_API_KEY` → model.api_key
//! - `GEMCHAT_MODEL` → model.name
//! - `GEMCHAT_MODEL_BASE_URL` → model.base_url
//!
//! ## HTTP
//! - `CORS_ORIGINS` → cors.origins (comma separated)
//! - `MAX_CONTENT_LENGTH` → uploads.max_content_length
//! - `GEMCHAT_FRONTEND_DIR` → frontend.dir
//!
//! ## Sessions
//! - `SESSION_TIMEOUT_HOURS` → sessions.timeout_hours
//! - `GEMCHAT_CLEANUP_INTERVAL_MINUTES` → sessions.cleanup_interval_minutes
//!
//! ## Observability
//! - `GEMCHAT_LOG_LEVEL` → observability.log_level
//! - `GEMCHAT_LOG_FORMAT` → observability.log_format
//! - `DEBUG` → observability.debug

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Default upload limit (50 MiB).
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 50 * 1024 * 1024;

/// Largest accepted session timeout (100 years).
pub const MAX_SESSION_TIMEOUT_HOURS: u64 = 100 * 365 * 24;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new()
        .map_or_else(
            || PathBuf::from(".gemchat"),
            |dirs| dirs.home_dir().join(".gemchat"),
        )
}

/// Get the configuration file path.
///
/// `GEMCHAT_CONFIG` wins over the default location.
pub fn config_path() -> PathBuf {
    std::env::var("GEMCHAT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Sections
// ============================================================================

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. `0.0.0.0` accepts remote connections.
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Remote model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model resource name, e.g. `models/gemini-2.0-flash`.
    #[serde(default = "default_model_name")]
    pub name: String,

    /// API credential. Required at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// API root, overridable for proxies and tests.
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            api_key: None,
            base_url: default_model_base_url(),
        }
    }
}

impl ModelConfig {
    /// The API credential, if one is configured and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// CORS allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins. A single `*` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: default_cors_origins(),
        }
    }
}

impl CorsConfig {
    /// Whether every origin is allowed.
    pub fn allows_any(&self) -> bool {
        self.origins.iter().any(|o| o.trim() == "*")
    }
}

/// Upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_content_length: default_max_content_length(),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Age after which the cleanup sweep removes a session.
    #[serde(default = "default_session_timeout_hours")]
    pub timeout_hours: u64,

    /// Run the cleanup sweep periodically. Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_interval_minutes: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_hours: default_session_timeout_hours(),
            cleanup_interval_minutes: None,
        }
    }
}

impl SessionConfig {
    /// Session timeout as a chrono duration, capped at
    /// [`MAX_SESSION_TIMEOUT_HOURS`].
    pub fn timeout(&self) -> chrono::Duration {
        let hours = self.timeout_hours.min(MAX_SESSION_TIMEOUT_HOURS);
        chrono::Duration::try_hours(i64::try_from(hours).unwrap_or_default())
            .unwrap_or_else(|| chrono::Duration::hours(24))
    }

    /// Periodic cleanup interval, if enabled.
    pub fn cleanup_interval(&self) -> Option<std::time::Duration> {
        self.cleanup_interval_minutes
            .filter(|m| *m > 0)
            .map(|m| std::time::Duration::from_secs(m * 60))
    }
}

/// Static frontend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Directory served for non-API GET requests.
    #[serde(default = "default_frontend_dir")]
    pub dir: PathBuf,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            dir: default_frontend_dir(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Debug mode. Forces `debug` log level.
    #[serde(default)]
    pub debug: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            debug: false,
        }
    }
}

impl ObservabilityConfig {
    /// Log level after applying the debug flag.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub uploads: UploadConfig,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub frontend: FrontendConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse().ok()) {
            self.network.port = port;
        }
        if let Some(bind) = lookup("GEMCHAT_BIND_ADDRESS") {
            self.network.bind = bind;
        }

        if let Some(key) = lookup("GOOGLE_API_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
            if !key.trim().is_empty() {
                self.model.api_key = Some(key);
            }
        }
        if let Some(name) = lookup("GEMCHAT_MODEL") {
            self.model.name = name;
        }
        if let Some(url) = lookup("GEMCHAT_MODEL_BASE_URL") {
            self.model.base_url = url;
        }

        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.cors.origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(max) = lookup("MAX_CONTENT_LENGTH").and_then(|m| m.trim().parse().ok()) {
            self.uploads.max_content_length = max;
        }
        if let Some(dir) = lookup("GEMCHAT_FRONTEND_DIR") {
            self.frontend.dir = PathBuf::from(dir);
        }

        if let Some(hours) = lookup("SESSION_TIMEOUT_HOURS").and_then(|h| h.trim().parse().ok()) {
            self.sessions.timeout_hours = hours;
        }
        if let Some(minutes) =
            lookup("GEMCHAT_CLEANUP_INTERVAL_MINUTES").and_then(|m| m.trim().parse().ok())
        {
            self.sessions.cleanup_interval_minutes = Some(minutes);
        }

        if let Some(level) = lookup("GEMCHAT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("GEMCHAT_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(debug) = lookup("DEBUG") {
            self.observability.debug = matches!(debug.trim().to_lowercase().as_str(), "true" | "1");
        }
    }

    /// Socket address for the listener.
    pub fn listen_address(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .network
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.network.bind))?;
        Ok(SocketAddr::new(ip, self.network.port))
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5000
}
fn default_model_name() -> String {
    "models/gemini-2.0-flash".into()
}
fn default_model_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}
fn default_max_content_length() -> usize {
    DEFAULT_MAX_CONTENT_LENGTH
}
fn default_session_timeout_hours() -> u64 {
    24
}
fn default_frontend_dir() -> PathBuf {
    PathBuf::from("frontend")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
