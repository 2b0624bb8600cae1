//! Persisted token collection and pending-auth record
//!
//! The token collection is serialized as a whole under one key on every
//! mutation. Record identity is the (issuer, client_id) pair decoded from
//! each access token, so at most one record exists per pair.

use std::sync::Arc;

use aiza_common::auth::jwt::{self, TokenCodecError};
use aiza_domain::constants::{PENDING_AUTH_STORAGE_KEY, TOKENS_STORAGE_KEY};
use aiza_domain::{AuthError, PendingAuth, Result, StoredToken, TokenKey, TokenResponse};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::storage::KeyValueStorage;

fn malformed(err: TokenCodecError) -> AuthError {
    AuthError::MalformedToken(err.to_string())
}

/// Identity of a stored token, read from its access token.
pub fn token_key(token: &StoredToken) -> Result<TokenKey> {
    let claims = jwt::decode_payload(&token.access_token).map_err(malformed)?;
    Ok(TokenKey::new(claims.iss, claims.client_id))
}

fn matches(token: &StoredToken, issuer: &str, client_id: &str) -> bool {
    jwt::decode_payload(&token.access_token).is_ok_and(|claims| claims.matches(issuer, client_id))
}

/// Token collection backed by [`KeyValueStorage`].
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Read the whole collection. Absent or corrupt data reads as empty.
    pub fn load(&self) -> Vec<StoredToken> {
        let raw = match self.storage.get(TOKENS_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read token store; treating as empty");
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Token store is corrupt; treating as empty");
            Vec::new()
        })
    }

    pub fn save(&self, tokens: &[StoredToken]) -> Result<()> {
        let raw = serde_json::to_string(tokens)?;
        self.storage.set(TOKENS_STORAGE_KEY, &raw)
    }

    /// Record for (issuer, client_id). Undecodable records never match.
    pub fn find<'a>(
        tokens: &'a [StoredToken],
        issuer: &str,
        client_id: &str,
    ) -> Option<&'a StoredToken> {
        tokens.iter().find(|token| matches(token, issuer, client_id))
    }

    /// Replace the record sharing `token`'s identity in place, or append.
    ///
    /// # Errors
    /// `AuthError::MalformedToken` when `token`'s access token cannot be
    /// decoded; the collection is returned unchanged only on success.
    pub fn merge(mut tokens: Vec<StoredToken>, token: StoredToken) -> Result<Vec<StoredToken>> {
        let key = token_key(&token)?;
        match tokens.iter_mut().find(|existing| matches(existing, &key.issuer, &key.client_id)) {
            Some(slot) => *slot = token,
            None => tokens.push(token),
        }
        Ok(tokens)
    }

    pub fn get(&self, issuer: &str, client_id: &str) -> Option<StoredToken> {
        Self::find(&self.load(), issuer, client_id).cloned()
    }

    /// Load, merge and persist in one step.
    pub fn upsert(&self, token: StoredToken) -> Result<()> {
        let tokens = Self::merge(self.load(), token)?;
        self.save(&tokens)
    }

    /// Drop the record for (issuer, client_id) and persist the rest.
    pub fn remove(&self, issuer: &str, client_id: &str) -> Result<()> {
        let mut tokens = self.load();
        let before = tokens.len();
        tokens.retain(|token| !matches(token, issuer, client_id));
        debug!(issuer, client_id, removed = before - tokens.len(), "Removed stored token");
        self.save(&tokens)
    }

    /// Turn a token endpoint response into a record and persist it.
    pub fn store_response(&self, response: TokenResponse, now: DateTime<Utc>) -> Result<StoredToken> {
        let token = StoredToken::from_response(response, now);
        self.upsert(token.clone())?;
        Ok(token)
    }
}

/// The single pending-auth record bridging login and callback.
#[derive(Clone)]
pub struct PendingAuthStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl PendingAuthStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Overwrites any earlier record.
    pub fn save(&self, pending: &PendingAuth) -> Result<()> {
        let raw = serde_json::to_string(pending)?;
        self.storage.set(PENDING_AUTH_STORAGE_KEY, &raw)
    }

    /// Read and invalidate the record. A corrupt record reads as absent.
    pub fn take(&self) -> Result<Option<PendingAuth>> {
        let Some(raw) = self.storage.get(PENDING_AUTH_STORAGE_KEY)? else {
            return Ok(None);
        };
        self.storage.remove(PENDING_AUTH_STORAGE_KEY)?;

        match serde_json::from_str(&raw) {
            Ok(pending) => Ok(Some(pending)),
            Err(e) => {
                warn!(error = %e, "Discarding corrupt pending auth record");
                Ok(None)
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.remove(PENDING_AUTH_STORAGE_KEY)
    }
}
