//! Domain types and models

pub mod server;
pub mod session;
pub mod token;
pub mod user;

pub use server::{server_id_for, ServerConfig, Service, ServiceConfig};
pub use session::{CallbackMessage, LoginState, PendingAuth};
pub use token::{StoredToken, TokenKey, TokenResponse};
pub use user::{BackendUserInfo, OAuthIdentity, OAuthUserInfo};
