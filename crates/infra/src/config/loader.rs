//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Loads a `.env` file if present
//! 2. Attempts to load from environment variables (`AIZA_APP_ORIGIN` must be
//!    set for this source to apply)
//! 3. Otherwise falls back to a config file, probing standard paths
//! 4. Without either, uses defaults
//!
//! ## Environment Variables
//! - `AIZA_APP_ORIGIN`: Origin the application is served from (required)
//! - `AIZA_REDIRECT_PATH`: OAuth redirect route
//! - `AIZA_SILENT_AUTH_TIMEOUT_MS`: Silent reauthentication timeout
//! - `AIZA_CLOCK_SKEW_SECS`: Seconds subtracted from token expiry
//! - `AIZA_REFRESH_INTERVAL_SECS`: Background token check cadence
//! - `AIZA_STORAGE_DIR`: Directory of the file-backed storage
//! - `AIZA_LOG_LEVEL`: `EnvFilter` directive
//! - `AIZA_LOG_FORMAT`: `pretty` or `json`
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.{json,toml}` or `./aiza.{json,toml}` (current working
//!    directory)
//! 2. `../config.{json,toml}`, `../../config.{json,toml}`
//! 3. The same names relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use aiza_domain::{
    AppConfig, AuthError, AuthSettings, LogFormat, LoggingConfig, Result, StorageConfig,
};
use url::Url;

const CONFIG_FILE_NAMES: [&str; 4] = ["config.json", "config.toml", "aiza.json", "aiza.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `AuthError::Config` if an environment value or the config file
/// that was found is invalid.
pub fn load() -> Result<AppConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            return Ok(config);
        }
        Err(e) => tracing::debug!(error = %e, "Environment configuration unavailable, trying file"),
    }

    if probe_config_paths().is_some() {
        return load_from_file(None);
    }

    tracing::info!("No configuration found; using defaults");
    Ok(AppConfig::default())
}

/// Load configuration from environment variables
///
/// `AIZA_APP_ORIGIN` is required; every other variable falls back to its
/// default.
///
/// # Errors
/// Returns `AuthError::Config` if `AIZA_APP_ORIGIN` is missing or any
/// variable has an invalid value.
pub fn load_from_env() -> Result<AppConfig> {
    let defaults = AuthSettings::default();

    let app_origin = env_var("AIZA_APP_ORIGIN").and_then(|s| {
        Url::parse(&s).map_err(|e| AuthError::Config(format!("Invalid app origin: {e}")))
    })?;

    let auth = AuthSettings {
        app_origin,
        redirect_path: env_opt("AIZA_REDIRECT_PATH").unwrap_or(defaults.redirect_path),
        default_scopes: defaults.default_scopes,
        silent_auth_timeout_ms: env_parse("AIZA_SILENT_AUTH_TIMEOUT_MS")?
            .unwrap_or(defaults.silent_auth_timeout_ms),
        clock_skew_secs: env_parse("AIZA_CLOCK_SKEW_SECS")?.unwrap_or(defaults.clock_skew_secs),
        refresh_interval_secs: env_parse("AIZA_REFRESH_INTERVAL_SECS")?
            .unwrap_or(defaults.refresh_interval_secs),
    };

    let storage = env_opt("AIZA_STORAGE_DIR")
        .map(|dir| StorageConfig { dir: PathBuf::from(dir) })
        .unwrap_or_default();

    let logging_defaults = LoggingConfig::default();
    let logging = LoggingConfig {
        level: env_opt("AIZA_LOG_LEVEL").unwrap_or(logging_defaults.level),
        format: match env_opt("AIZA_LOG_FORMAT") {
            Some(format) => parse_log_format(&format)?,
            None => logging_defaults.format,
        },
    };

    Ok(AppConfig { auth, storage, logging, backend: None })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. JSON and TOML are
/// detected by file extension.
///
/// # Errors
/// Returns `AuthError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(AuthError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            AuthError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| AuthError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration, choosing the format by the file extension.
fn parse_config(contents: &str, path: &Path) -> Result<AppConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| AuthError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| AuthError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(AuthError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidates_in(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidates_in(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidates_in(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = CONFIG_FILE_NAMES.iter().map(|name| dir.join(name)).collect();
    for parent in ["..", "../.."] {
        paths.push(dir.join(parent).join("config.json"));
        paths.push(dir.join(parent).join("config.toml"));
    }
    paths
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| AuthError::Config(format!("Missing required environment variable: {key}")))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| AuthError::Config(format!("Invalid {key}: {e}")))
        })
        .transpose()
}

fn parse_log_format(raw: &str) -> Result<LogFormat> {
    match raw.to_ascii_lowercase().as_str() {
        "pretty" | "text" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(AuthError::Config(format!("Invalid AIZA_LOG_FORMAT: {other}"))),
    }
}
