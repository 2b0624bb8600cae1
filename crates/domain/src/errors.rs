//! Error types used throughout the authentication layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for authentication operations
///
/// Refresh failures and silent-auth failures never surface through this type:
/// they are recovered inside the service and reported as a logged-out state or
/// an absent token.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum AuthError {
    /// Server or service configuration is not resolved yet. Callers should
    /// wait for backend discovery and retry.
    #[error("Backend not configured: {0}")]
    BackendNotConfigured(String),

    /// An authorization callback arrived without a preceding login.
    #[error("No pending authentication found")]
    NoPendingAuth,

    /// The token endpoint rejected the request or could not be reached.
    #[error("Token exchange failed{}: {message}", http_status_suffix(.status))]
    TokenExchangeFailed { status: Option<u16>, message: String },

    /// An expired token has no refresh token to renew it with.
    #[error("No refresh token stored")]
    NoRefreshToken,

    /// A token payload could not be decoded; the token must be discarded.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// A resource server answered 401 for an access token we believed valid.
    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Build a `TokenExchangeFailed` for a transport-level failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TokenExchangeFailed { status: None, message: message.into() }
    }

    /// Whether retrying the same call later may succeed without user action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BackendNotConfigured(_) => true,
            Self::TokenExchangeFailed { status, .. } => match status {
                None => true,
                Some(code) => *code >= 500,
            },
            Self::NoPendingAuth
            | Self::NoRefreshToken
            | Self::MalformedToken(_)
            | Self::TokenRevoked
            | Self::Storage(_)
            | Self::Navigation(_)
            | Self::Config(_) => false,
        }
    }

    /// Stable label suitable for structured logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::BackendNotConfigured(_) => "backend_not_configured",
            Self::NoPendingAuth => "no_pending_auth",
            Self::NoRefreshToken => "no_refresh_token",
            Self::TokenExchangeFailed { .. } => "token_exchange_failed",
            Self::MalformedToken(_) => "malformed_token",
            Self::TokenRevoked => "token_revoked",
            Self::Storage(_) => "storage",
            Self::Navigation(_) => "navigation",
            Self::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization failed: {err}"))
    }
}

fn http_status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" (HTTP {code})")).unwrap_or_default()
}

/// Result type alias for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;
