//! Token codec and PKCE helpers for the OAuth2 authorization-code flow
//!
//! Both modules are pure: no I/O, no logging. Persistence and HTTP live in
//! `aiza-core` and `aiza-infra`.

pub mod jwt;
pub mod pkce;

pub use jwt::{decode_payload, is_valid, is_valid_with_skew, TokenClaims, TokenCodecError};
pub use pkce::{challenge, generate_state, random_verifier, PkceChallenge};
