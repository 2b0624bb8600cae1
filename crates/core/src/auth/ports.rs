//! Port interfaces for the auth flow
//!
//! These traits define the boundaries between the session logic and the
//! HTTP client, the hosting browser, and the backend discovery layer.

use std::fmt;
use std::sync::Arc;

use aiza_domain::{
    BackendUserInfo, CallbackMessage, OAuthUserInfo, Result, ServerConfig, TokenResponse,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

/// Source of the currently resolved backend configuration.
///
/// `None` while discovery is pending or no backend is connected.
pub trait ServerConfigSource: Send + Sync {
    fn current(&self) -> Option<Arc<ServerConfig>>;
}

/// `grant_type=authorization_code` request.
#[derive(Clone)]
pub struct CodeExchange {
    pub token_endpoint: Url,
    pub client_id: String,
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: Url,
}

impl fmt::Debug for CodeExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeExchange")
            .field("token_endpoint", &self.token_endpoint.as_str())
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri.as_str())
            .finish_non_exhaustive()
    }
}

/// `grant_type=refresh_token` request.
#[derive(Clone)]
pub struct RefreshGrant {
    pub token_endpoint: Url,
    pub client_id: String,
    pub refresh_token: String,
}

impl fmt::Debug for RefreshGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshGrant")
            .field("token_endpoint", &self.token_endpoint.as_str())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Trait for the token endpoint and the bearer-authenticated profile
/// documents
///
/// Non-2xx token responses map to `AuthError::TokenExchangeFailed` with the
/// status; transport failures map to the same variant without one. Profile
/// fetches map `401` to `AuthError::TokenRevoked` and any other non-2xx to
/// `Ok(None)`.
#[async_trait]
pub trait OAuthClientTrait: Send + Sync {
    async fn exchange_code_for_tokens(&self, request: CodeExchange) -> Result<TokenResponse>;

    async fn refresh_access_token(&self, request: RefreshGrant) -> Result<TokenResponse>;

    async fn fetch_user_info(
        &self,
        userinfo_endpoint: &Url,
        access_token: &str,
    ) -> Result<Option<OAuthUserInfo>>;

    /// `GET {backend_url}/accounts/me`.
    async fn fetch_backend_user_info(
        &self,
        backend_url: &Url,
        access_token: &str,
    ) -> Result<Option<BackendUserInfo>>;
}

/// Full top-level navigation of the hosting window.
pub trait Navigator: Send + Sync {
    fn assign(&self, url: &Url) -> Result<()>;
}

/// A message posted to the hosting window.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMessage {
    /// Serialized origin of the sender.
    pub origin: String,
    pub data: serde_json::Value,
}

/// A mounted hidden frame and its message listener.
///
/// Dropping the session removes both.
pub struct FrameSession {
    messages: mpsc::UnboundedReceiver<FrameMessage>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl FrameSession {
    pub fn new(
        messages: mpsc::UnboundedReceiver<FrameMessage>,
        teardown: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self { messages, teardown: Some(Box::new(teardown)) }
    }

    /// Next message posted to the window, or `None` once the frame is gone.
    pub async fn next_message(&mut self) -> Option<FrameMessage> {
        self.messages.recv().await
    }
}

impl fmt::Debug for FrameSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSession").field("mounted", &self.teardown.is_some()).finish()
    }
}

impl Drop for FrameSession {
    fn drop(&mut self) {
        self.messages.close();
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

/// Host able to run an authorization request in an invisible frame.
#[async_trait]
pub trait SilentAuthFrame: Send + Sync {
    /// Attach a message listener, then navigate a hidden frame to `url`.
    async fn mount(&self, url: Url) -> Result<FrameSession>;
}

/// Channel from an embedded callback page to the window hosting it.
pub trait ParentRelay: Send + Sync {
    fn post_message(&self, message: &CallbackMessage, target_origin: &str) -> Result<()>;
}
