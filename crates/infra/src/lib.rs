//! # Aiza Infrastructure
//!
//! Adapters for the ports defined in `aiza-core`.
//!
//! This crate contains:
//! - The reqwest-based OAuth token/userinfo client
//! - File-backed key-value storage with change notifications
//! - The system-browser navigator
//! - Configuration loading and tracing initialisation

pub mod bootstrap;
pub mod config;
pub mod http;
pub mod navigator;
pub mod observability;
pub mod storage;

pub use bootstrap::{build_auth_stack, AuthStack};
pub use http::OAuthClient;
pub use navigator::SystemBrowserNavigator;
pub use observability::init_tracing;
pub use storage::FileStorage;
