//! Tracing subscriber setup.

use aiza_domain::{AuthError, LogFormat, LoggingConfig, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns `Ok(false)` when a
/// global subscriber was already installed, so repeated calls are harmless.
///
/// # Errors
/// Returns `AuthError::Config` if `config.level` is not a valid filter
/// directive.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| AuthError::Config(format!("Invalid log level '{}': {e}", config.level)))?,
    };

    let installed = match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false);

            Registry::default().with(env_filter).with(fmt_layer).try_init().is_ok()
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false);

            Registry::default().with(env_filter).with(fmt_layer).try_init().is_ok()
        }
    };

    if installed {
        tracing::debug!(level = %config.level, format = ?config.format, "Tracing initialised");
    }
    Ok(installed)
}
