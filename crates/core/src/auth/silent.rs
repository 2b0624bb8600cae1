//! Silent reauthentication
//!
//! Runs a `prompt=none` authorization request in a hidden frame and waits
//! for the callback page inside it to relay the result. Attempts for the
//! same (backend, client) pair are coalesced into one frame, and every
//! failure resolves to `None`.

use std::collections::HashMap;
use std::sync::Arc;

use aiza_common::auth::pkce::{generate_state, PkceChallenge};
use aiza_common::time::Clock;
use aiza_domain::{AuthSettings, CallbackMessage, Result, ServerConfig, ServiceConfig};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::ports::{CodeExchange, FrameSession, OAuthClientTrait, SilentAuthFrame};
use super::request::authorization_url;
use super::token_store::TokenStore;

/// (server_id, client_id)
type FlightKey = (String, String);
type Flight = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Clone)]
pub struct SilentReauthEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    frame: Arc<dyn SilentAuthFrame>,
    oauth: Arc<dyn OAuthClientTrait>,
    tokens: TokenStore,
    clock: Arc<dyn Clock>,
    settings: Arc<AuthSettings>,
    in_flight: Mutex<HashMap<FlightKey, Flight>>,
}

impl SilentReauthEngine {
    pub fn new(
        frame: Arc<dyn SilentAuthFrame>,
        oauth: Arc<dyn OAuthClientTrait>,
        tokens: TokenStore,
        clock: Arc<dyn Clock>,
        settings: Arc<AuthSettings>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                frame,
                oauth,
                tokens,
                clock,
                settings,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Obtain an access token for `service` without user interaction.
    ///
    /// Joins the attempt already in flight for the same backend and client
    /// when there is one.
    pub async fn authenticate(&self, server: Arc<ServerConfig>, service: ServiceConfig) -> Option<String> {
        let key = (server.server_id(), service.client_id.clone());

        let flight = {
            let mut in_flight = self.inner.in_flight.lock();
            if let Some(existing) = in_flight.get(&key) {
                debug!(server_id = %key.0, client_id = %key.1, "Joining in-flight silent reauthentication");
                existing.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let settled_key = key.clone();
                let flight = async move {
                    let outcome = inner.attempt(&server, &service).await;
                    inner.in_flight.lock().remove(&settled_key);
                    outcome
                }
                .boxed()
                .shared();
                in_flight.insert(key, flight.clone());
                flight
            }
        };

        flight.await
    }

    /// Number of attempts currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }
}

impl EngineInner {
    async fn attempt(&self, server: &ServerConfig, service: &ServiceConfig) -> Option<String> {
        match self.try_attempt(server, service).await {
            Ok(token) => token,
            Err(e) => {
                warn!(
                    client_id = %service.client_id,
                    error = %e,
                    "Silent reauthentication failed"
                );
                None
            }
        }
    }

    async fn try_attempt(&self, server: &ServerConfig, service: &ServiceConfig) -> Result<Option<String>> {
        let pkce = PkceChallenge::generate();
        let state = generate_state();
        let url = authorization_url(server, service, &self.settings, &pkce.code_challenge, Some(&state))?;

        let mut session = self.frame.mount(url).await?;
        let origin = self.settings.origin();
        let reply = tokio::time::timeout(
            self.settings.silent_auth_timeout(),
            wait_for_callback(&mut session, &origin, &state),
        )
        .await;
        drop(session);

        let message = match reply {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(client_id = %service.client_id, "Silent frame closed without a callback");
                return Ok(None);
            }
            Err(_) => {
                info!(
                    client_id = %service.client_id,
                    timeout_ms = self.settings.silent_auth_timeout_ms,
                    "Silent reauthentication timed out"
                );
                return Ok(None);
            }
        };

        let Some(code) = message.code else {
            debug!(
                client_id = %service.client_id,
                error = message.error.as_deref().unwrap_or("none"),
                "Silent callback carried no code"
            );
            return Ok(None);
        };

        let response = self
            .oauth
            .exchange_code_for_tokens(CodeExchange {
                token_endpoint: server.token_endpoint.clone(),
                client_id: service.client_id.clone(),
                code,
                code_verifier: pkce.code_verifier,
                redirect_uri: self.settings.redirect_uri()?,
            })
            .await?;
        let token = self.tokens.store_response(response, self.clock.now())?;

        info!(client_id = %service.client_id, "Silent reauthentication succeeded");
        Ok(Some(token.access_token))
    }
}

/// First `oauth_callback` message from `origin` carrying `state`.
async fn wait_for_callback(
    session: &mut FrameSession,
    origin: &str,
    state: &str,
) -> Option<CallbackMessage> {
    while let Some(message) = session.next_message().await {
        if message.origin != origin {
            continue;
        }
        let Ok(callback) = serde_json::from_value::<CallbackMessage>(message.data) else {
            continue;
        };
        if callback.is_oauth_callback() && callback.state.as_deref() == Some(state) {
            return Some(callback);
        }
    }
    None
}
