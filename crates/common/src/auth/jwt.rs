//! JWT payload inspection without signature verification
//!
//! Signature checks are the backend's job. The client only needs the
//! issuer, expiry and client binding to key and expire its token store.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// base64url that accepts segments with or without trailing `=`.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Some issuers emit the standard alphabet in the payload segment.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TokenCodecError {
    #[error("token has no payload segment")]
    MissingPayload,

    #[error("payload is not valid base64: {0}")]
    Encoding(String),

    #[error("payload is not a valid claims document: {0}")]
    Claims(String),
}

/// The claims the token store keys and expires on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    /// Expiry in seconds since the UNIX epoch.
    pub exp: i64,
    pub client_id: String,
}

impl TokenClaims {
    /// Whether `exp` (less `skew_ms`) is strictly after `now_ms`.
    #[must_use]
    pub fn is_valid_at(&self, now_ms: i64, skew_ms: i64) -> bool {
        self.exp.saturating_mul(1000).saturating_sub(skew_ms) > now_ms
    }

    #[must_use]
    pub fn matches(&self, issuer: &str, client_id: &str) -> bool {
        self.iss == issuer && self.client_id == client_id
    }
}

/// Decode the middle segment of a JWT.
///
/// # Errors
/// Returns [`TokenCodecError`] if the segment is missing or is not
/// base64-encoded JSON carrying `iss`, `exp` and `client_id`.
pub fn decode_payload(token: &str) -> Result<TokenClaims, TokenCodecError> {
    let segment = token
        .split('.')
        .nth(1)
        .filter(|s| !s.is_empty())
        .ok_or(TokenCodecError::MissingPayload)?;

    let bytes = URL_SAFE_LENIENT
        .decode(segment)
        .or_else(|_| STANDARD_LENIENT.decode(segment))
        .map_err(|e| TokenCodecError::Encoding(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| TokenCodecError::Claims(e.to_string()))
}

/// `exp * 1000 > now_ms`. Undecodable tokens are invalid.
#[must_use]
pub fn is_valid(token: &str, now_ms: i64) -> bool {
    is_valid_with_skew(token, now_ms, 0)
}

/// Like [`is_valid`] but treats the token as expiring `skew_ms` early.
#[must_use]
pub fn is_valid_with_skew(token: &str, now_ms: i64, skew_ms: i64) -> bool {
    decode_payload(token).is_ok_and(|claims| claims.is_valid_at(now_ms, skew_ms))
}
