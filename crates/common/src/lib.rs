//! Leaf utilities shared across Aiza crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: token codec and PKCE generator
//! - `runtime`: clock abstraction
//! - `test-utils`: mock clock and unsigned JWT builder

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod auth;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod time;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(feature = "test-utils")]
pub mod testing;

#[cfg(feature = "foundation")]
pub use auth::jwt::{TokenClaims, TokenCodecError};
#[cfg(feature = "foundation")]
pub use auth::pkce::PkceChallenge;
#[cfg(feature = "runtime")]
pub use time::{Clock, SystemClock};
