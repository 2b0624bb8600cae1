//! # Aiza Core
//!
//! Client-side OAuth2 session logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (storage, OAuth HTTP, navigation, hidden frames)
//! - The token store and login-state derivation
//! - The auth flow controller, silent reauthentication and callback page
//!
//! ## Architecture Principles
//! - Only depends on `aiza-common` and `aiza-domain`
//! - No HTTP, filesystem, or browser code
//! - All external dependencies via traits

pub mod auth;
pub mod backend;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export specific items to avoid ambiguity
pub use auth::callback::{CallbackOutcome, CallbackPage, CallbackParams};
pub use auth::login_state::derive_login_state;
pub use auth::ports::{
    CodeExchange, FrameMessage, FrameSession, Navigator, OAuthClientTrait, ParentRelay,
    RefreshGrant, ServerConfigSource, SilentAuthFrame,
};
pub use auth::service::{AuthService, AuthServiceBuilder};
pub use auth::silent::SilentReauthEngine;
pub use auth::token_store::{PendingAuthStore, TokenStore};
pub use backend::BackendRegistry;
pub use storage::{KeyValueStorage, MemoryStorage, StorageChange};
