//! Login-state derivation
//!
//! Login state is never stored. It is recomputed from the token collection
//! whenever it is asked for.

use aiza_common::auth::jwt;
use aiza_domain::{LoginState, StoredToken};

use super::token_store::TokenStore;

/// `LoggedIn` iff the record for (issuer, client_id) holds an access token
/// that is still valid at `now_ms` once `skew_ms` is subtracted from its
/// expiry.
#[must_use]
pub fn derive_login_state(
    tokens: &[StoredToken],
    issuer: &str,
    client_id: &str,
    now_ms: i64,
    skew_ms: i64,
) -> LoginState {
    match TokenStore::find(tokens, issuer, client_id) {
        Some(token) if jwt::is_valid_with_skew(&token.access_token, now_ms, skew_ms) => {
            LoginState::LoggedIn
        }
        _ => LoginState::LoggedOut,
    }
}
