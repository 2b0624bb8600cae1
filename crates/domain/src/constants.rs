//! Application constants
//!
//! Well-known storage keys and protocol defaults shared by every layer.

// Persisted state keys (per-origin key-value store)
pub const TOKENS_STORAGE_KEY: &str = "aiza_tokens";
pub const PENDING_AUTH_STORAGE_KEY: &str = "aiza_pending_auth";

// OAuth redirect route served by the hosting application
pub const DEFAULT_REDIRECT_PATH: &str = "/cognito_redirect";

// Silent reauthentication
pub const DEFAULT_SILENT_AUTH_TIMEOUT_MS: u64 = 10_000;
pub const OAUTH_CALLBACK_MESSAGE_TYPE: &str = "oauth_callback";

// Token lifecycle
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 0;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 5 * 60;

// PKCE
pub const CODE_VERIFIER_LENGTH: usize = 40;
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Scopes requested when a service configuration does not list any.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "email"];
