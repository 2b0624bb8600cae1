//! Session state shared between the login flow and the callback page

use serde::{Deserialize, Serialize};
use url::Url;

use super::server::Service;
use crate::constants::OAUTH_CALLBACK_MESSAGE_TYPE;

/// Record persisted between `login` and the callback that completes it.
///
/// Holds everything the callback needs to finish the exchange without
/// consulting the server configuration again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuth {
    pub server_id: String,
    pub service: Service,
    pub code_verifier: String,
    pub client_id: String,
    pub token_endpoint: Url,
}

/// Interactive session state of the primary service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    LoggedIn,
    #[default]
    LoggedOut,
}

impl LoginState {
    #[must_use]
    pub fn is_logged_in(self) -> bool {
        matches!(self, Self::LoggedIn)
    }
}

/// Message relayed from an embedded callback page to its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl CallbackMessage {
    #[must_use]
    pub fn oauth_callback(code: Option<String>, error: Option<String>, state: Option<String>) -> Self {
        Self { kind: OAUTH_CALLBACK_MESSAGE_TYPE.to_string(), code, error, state }
    }

    #[must_use]
    pub fn is_oauth_callback(&self) -> bool {
        self.kind == OAUTH_CALLBACK_MESSAGE_TYPE
    }
}
