//! # Aiza Domain
//!
//! Data model for the client authentication layer.
//!
//! This crate contains:
//! - Backend configuration (`ServerConfig`, `ServiceConfig`, `Service`)
//! - Token records (`StoredToken`, `TokenResponse`) and session records
//!   (`PendingAuth`, `LoginState`)
//! - Settings structures loaded by the infrastructure layer
//! - The `AuthError` taxonomy and `Result` alias
//!
//! ## Architecture
//! - No dependencies on other Aiza crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
