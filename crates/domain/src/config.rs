//! Application configuration models
//!
//! Plain data only. Loading from environment and files lives in
//! `aiza-infra::config`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    DEFAULT_CLOCK_SKEW_SECS, DEFAULT_REDIRECT_PATH, DEFAULT_REFRESH_INTERVAL_SECS,
    DEFAULT_SCOPES, DEFAULT_SILENT_AUTH_TIMEOUT_MS,
};
use crate::errors::{AuthError, Result};
use crate::types::ServerConfig;

/// Settings of the auth session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Origin the application is served from. Callback messages are only
    /// accepted from this origin.
    #[serde(default = "default_app_origin")]
    pub app_origin: Url,
    #[serde(default = "default_redirect_path")]
    pub redirect_path: String,
    /// Scopes requested when a service config lists none.
    #[serde(default = "default_scopes")]
    pub default_scopes: Vec<String>,
    #[serde(default = "default_silent_auth_timeout_ms")]
    pub silent_auth_timeout_ms: u64,
    /// Seconds subtracted from `exp` before comparing against now.
    #[serde(default)]
    pub clock_skew_secs: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            app_origin: default_app_origin(),
            redirect_path: default_redirect_path(),
            default_scopes: default_scopes(),
            silent_auth_timeout_ms: default_silent_auth_timeout_ms(),
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl AuthSettings {
    /// Redirect URI registered with the identity provider.
    pub fn redirect_uri(&self) -> Result<Url> {
        self.app_origin
            .join(&self.redirect_path)
            .map_err(|e| AuthError::Config(format!("invalid redirect path {}: {e}", self.redirect_path)))
    }

    /// Serialized origin (`scheme://host[:port]`) of the application.
    #[must_use]
    pub fn origin(&self) -> String {
        self.app_origin.origin().ascii_serialization()
    }

    #[must_use]
    pub fn silent_auth_timeout(&self) -> Duration {
        Duration::from_millis(self.silent_auth_timeout_ms)
    }

    #[must_use]
    pub fn clock_skew_ms(&self) -> i64 {
        i64::try_from(self.clock_skew_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

fn default_app_origin() -> Url {
    Url::parse("http://localhost:3000").unwrap_or_else(|_| unreachable!("static URL parses"))
}

fn default_redirect_path() -> String {
    DEFAULT_REDIRECT_PATH.to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect()
}

fn default_silent_auth_timeout_ms() -> u64 {
    DEFAULT_SILENT_AUTH_TIMEOUT_MS
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

/// Where the file-backed key-value storage keeps its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from(".aiza") }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `aiza_core=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: LogFormat::default() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Backend to connect to at startup, if any.
    #[serde(default)]
    pub backend: Option<ServerConfig>,
}
