//! PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
//!
//! Implements RFC 7636 with the `S256` method.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Default verifier length.
pub const DEFAULT_VERIFIER_LENGTH: usize = 40;

/// Length of the `state` value sent with silent authorization requests.
const STATE_LENGTH: usize = 32;

/// Draw `length` characters uniformly from `[A-Za-z0-9]`.
///
/// Uses the thread-local CSPRNG.
#[must_use]
pub fn random_verifier(length: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(length).map(char::from).collect()
}

/// BASE64URL(SHA256(verifier)) without padding.
#[must_use]
pub fn challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Random value correlating an authorization request with its callback.
#[must_use]
pub fn generate_state() -> String {
    random_verifier(STATE_LENGTH)
}

/// Verifier/challenge pair for one authorization request.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Kept secret until token exchange.
    pub code_verifier: String,
    /// Sent in the authorization request.
    pub code_challenge: String,
}

impl PkceChallenge {
    #[must_use]
    pub fn generate() -> Self {
        Self::with_length(DEFAULT_VERIFIER_LENGTH)
    }

    #[must_use]
    pub fn with_length(length: usize) -> Self {
        let code_verifier = random_verifier(length);
        let code_challenge = challenge(&code_verifier);
        Self { code_verifier, code_challenge }
    }

    /// Always `"S256"`.
    #[must_use]
    pub fn challenge_method(&self) -> &'static str {
        "S256"
    }
}
