//! OAuth2 authorization-code + PKCE session management

pub mod callback;
pub mod login_state;
pub mod ports;
pub mod service;
pub mod silent;
pub mod token_store;

mod request;
