//! Unsigned JWT builder
//!
//! Produces `header.payload.signature` strings the token codec can read.
//! The signature segment is a fixed placeholder.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;

/// Build an unsigned JWT carrying `iss`, `client_id` and `exp` (seconds).
#[must_use]
pub fn unsigned_jwt(iss: &str, client_id: &str, exp: i64) -> String {
    unsigned_jwt_with(iss, client_id, exp, &json!({}))
}

/// Like [`unsigned_jwt`] with extra claims merged into the payload, so two
/// tokens with the same identity and expiry can still differ.
#[must_use]
pub fn unsigned_jwt_with(iss: &str, client_id: &str, exp: i64, extra: &serde_json::Value) -> String {
    let mut payload = json!({ "iss": iss, "client_id": client_id, "exp": exp });
    if let (Some(target), Some(source)) = (payload.as_object_mut(), extra.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.unsigned")
}
