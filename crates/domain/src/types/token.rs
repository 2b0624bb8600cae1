//! Token records
//!
//! `StoredToken` is what the token store persists. Its identity is not stored
//! alongside it: the (issuer, client_id) pair is read back from the access
//! token's own payload, so the store is a plain sequence of records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a stored token: one record per (issuer, client_id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub issuer: String,
    pub client_id: String,
}

impl TokenKey {
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self { issuer: issuer.into(), client_id: client_id.into() }
    }
}

/// OAuth token response from the token endpoint (RFC 6749 §5.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    pub expires_in: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Absent on most refresh responses.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Persisted token record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds, as issued.
    pub expires_in: i64,
    /// Absolute expiry computed when the record was written.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    /// Build a record from a code-exchange (or silent-auth) response.
    #[must_use]
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            expires_at: expiry(now, response.expires_in),
            access_token: response.access_token,
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
        }
    }

    /// Apply a refresh response on top of this record.
    ///
    /// Refresh and id tokens are kept when the response omits them.
    #[must_use]
    pub fn apply_refresh(&self, response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            expires_at: expiry(now, response.expires_in),
            access_token: response.access_token,
            id_token: response.id_token.or_else(|| self.id_token.clone()),
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
            expires_in: response.expires_in,
        }
    }

    /// Refresh token, if one was issued and is non-empty.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Saturates at `DateTime::<Utc>::MAX_UTC`; `expires_in` comes from the
/// token endpoint and is unbounded.
fn expiry(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    Duration::try_seconds(expires_in.max(0))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
