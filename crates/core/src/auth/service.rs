//! Auth flow controller
//!
//! Drives interactive login and logout, completes the authorization-code
//! exchange, hands out access tokens per service and publishes the derived
//! login state of the primary service.

use std::sync::Arc;

use aiza_common::auth::jwt;
use aiza_common::auth::pkce::PkceChallenge;
use aiza_common::time::{Clock, SystemClock};
use aiza_domain::constants::TOKENS_STORAGE_KEY;
use aiza_domain::{
    AuthError, AuthSettings, BackendUserInfo, LoginState, OAuthUserInfo, PendingAuth, Result,
    ServerConfig, Service, ServiceConfig, StoredToken,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::login_state::derive_login_state;
use super::ports::{
    CodeExchange, Navigator, OAuthClientTrait, RefreshGrant, ServerConfigSource, SilentAuthFrame,
};
use super::request::authorization_url;
use super::silent::SilentReauthEngine;
use super::token_store::{PendingAuthStore, TokenStore};
use crate::storage::KeyValueStorage;

/// Auth flow controller
pub struct AuthService {
    config: Arc<dyn ServerConfigSource>,
    oauth: Arc<dyn OAuthClientTrait>,
    navigator: Arc<dyn Navigator>,
    storage: Arc<dyn KeyValueStorage>,
    tokens: TokenStore,
    pending: PendingAuthStore,
    silent: SilentReauthEngine,
    clock: Arc<dyn Clock>,
    settings: Arc<AuthSettings>,
    state: watch::Sender<LoginState>,
}

impl AuthService {
    pub fn builder(settings: AuthSettings) -> AuthServiceBuilder {
        AuthServiceBuilder::new(settings)
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.tokens
    }

    /// Start an interactive login for the primary service.
    ///
    /// Persists the pending-auth record, then navigates the window to the
    /// authorization endpoint. Returns the URL navigated to.
    ///
    /// # Errors
    /// `AuthError::BackendNotConfigured` without a backend or an `api` client.
    pub fn login(&self) -> Result<Url> {
        let (server, service) = self.require_service(Service::Api)?;
        let pkce = PkceChallenge::generate();

        self.pending.save(&PendingAuth {
            server_id: server.server_id(),
            service: Service::Api,
            code_verifier: pkce.code_verifier.clone(),
            client_id: service.client_id.clone(),
            token_endpoint: server.token_endpoint.clone(),
        })?;

        let url = authorization_url(&server, &service, &self.settings, &pkce.code_challenge, None)?;
        info!(server_id = %server.server_id(), client_id = %service.client_id, "Starting interactive login");
        self.navigator.assign(&url)?;
        Ok(url)
    }

    /// Drop the primary token, then navigate to the end-session endpoint.
    ///
    /// Succeeds when no token is stored.
    pub fn logout(&self) -> Result<Url> {
        let (server, service) = self.require_service(Service::Api)?;

        self.tokens.remove(&server.issuer, &service.client_id)?;
        self.pending.clear()?;
        self.publish(LoginState::LoggedOut);

        let mut url = server.end_session_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &service.client_id)
            .append_pair("logout_uri", &self.settings.origin());

        info!(server_id = %server.server_id(), client_id = %service.client_id, "Logging out");
        self.navigator.assign(&url)?;
        Ok(url)
    }

    /// Complete an interactive login with the code from the redirect.
    ///
    /// The pending-auth record is consumed before the exchange, so a second
    /// call fails with `AuthError::NoPendingAuth`.
    pub async fn handle_oauth_callback(&self, code: &str) -> Result<StoredToken> {
        let pending = self.pending.take()?.ok_or(AuthError::NoPendingAuth)?;
        let redirect_uri = self.settings.redirect_uri()?;

        let exchanged = self
            .oauth
            .exchange_code_for_tokens(CodeExchange {
                token_endpoint: pending.token_endpoint,
                client_id: pending.client_id.clone(),
                code: code.to_string(),
                code_verifier: pending.code_verifier,
                redirect_uri,
            })
            .await
            .and_then(|response| self.tokens.store_response(response, self.clock.now()));

        self.refresh_login_state();
        match &exchanged {
            Ok(_) => info!(
                server_id = %pending.server_id,
                service = %pending.service,
                client_id = %pending.client_id,
                "Authorization code exchanged"
            ),
            Err(e) => warn!(
                server_id = %pending.server_id,
                client_id = %pending.client_id,
                error = %e,
                "Authorization code exchange failed"
            ),
        }
        exchanged
    }

    /// Access token for `service`, refreshing or silently reauthenticating
    /// as needed.
    ///
    /// Returns `Ok(None)` when no token can be obtained. Refresh failures
    /// delete the stored record rather than erroring.
    ///
    /// # Errors
    /// `AuthError::BackendNotConfigured` without a backend, or without an
    /// `api` client when `service` is the primary one.
    pub async fn get_access_token(&self, service: Service) -> Result<Option<String>> {
        let server = self.require_server()?;
        let Some(service_config) = server.service(service).cloned() else {
            if service.is_primary() {
                return Err(AuthError::BackendNotConfigured(format!("no {service} client")));
            }
            debug!(%service, "Service not offered by backend");
            return Ok(None);
        };

        if let Some(token) = self.cached_or_refreshed(&server, service, &service_config).await? {
            return Ok(Some(token));
        }

        if service.is_primary() {
            self.publish(LoginState::LoggedOut);
            return Ok(None);
        }

        // The primary session authorises the silent attempt; renew it first
        // if it has only expired.
        let (_, primary) = self.require_service(Service::Api)?;
        if self.cached_or_refreshed(&server, Service::Api, &primary).await?.is_none() {
            self.publish(LoginState::LoggedOut);
            debug!(%service, "Primary session absent; skipping silent reauthentication");
            return Ok(None);
        }

        Ok(self.silent.authenticate(server, service_config).await)
    }

    /// Cached token if still valid, otherwise the result of a refresh.
    ///
    /// A token that cannot be refreshed is deleted.
    async fn cached_or_refreshed(
        &self,
        server: &ServerConfig,
        service: Service,
        service_config: &ServiceConfig,
    ) -> Result<Option<String>> {
        let Some(token) = self.tokens.get(&server.issuer, &service_config.client_id) else {
            return Ok(None);
        };

        let access_token = if self.is_fresh(&token) {
            token.access_token
        } else {
            match self.refresh(server, service_config, &token).await {
                Ok(refreshed) => refreshed.access_token,
                Err(e) => {
                    warn!(%service, client_id = %service_config.client_id, error = %e, "Token refresh failed; discarding token");
                    self.tokens.remove(&server.issuer, &service_config.client_id)?;
                    return Ok(None);
                }
            }
        };

        if service.is_primary() {
            self.publish(LoginState::LoggedIn);
        }
        Ok(Some(access_token))
    }

    /// Userinfo document of the primary session.
    ///
    /// A revoked token is refreshed once; if that fails the session is
    /// logged out and `Ok(None)` is returned.
    pub async fn user_info(&self) -> Result<Option<OAuthUserInfo>> {
        let server = self.require_server()?;
        let Some(access_token) = self.get_access_token(Service::Api).await? else {
            return Ok(None);
        };

        let endpoint = &server.userinfo_endpoint;
        match self.oauth.fetch_user_info(endpoint, &access_token).await {
            Err(AuthError::TokenRevoked) => {}
            other => return other,
        }

        let Some(renewed) = self.recover_revoked(&server).await? else {
            return Ok(None);
        };
        Ok(self.oauth.fetch_user_info(endpoint, &renewed).await.unwrap_or_else(|e| {
            warn!(error = %e, "Userinfo still unavailable after refresh");
            None
        }))
    }

    /// Backend account of the primary session, with the same revocation
    /// handling as [`user_info`](Self::user_info).
    pub async fn backend_user_info(&self) -> Result<Option<BackendUserInfo>> {
        let server = self.require_server()?;
        let Some(access_token) = self.get_access_token(Service::Api).await? else {
            return Ok(None);
        };

        let backend_url = &server.backend_url;
        match self.oauth.fetch_backend_user_info(backend_url, &access_token).await {
            Err(AuthError::TokenRevoked) => {}
            other => return other,
        }

        let Some(renewed) = self.recover_revoked(&server).await? else {
            return Ok(None);
        };
        Ok(self.oauth.fetch_backend_user_info(backend_url, &renewed).await.unwrap_or_else(|e| {
            warn!(error = %e, "Backend account still unavailable after refresh");
            None
        }))
    }

    /// Refresh the primary token after a resource server rejected it.
    ///
    /// Returns the renewed access token, or `None` after logging out.
    async fn recover_revoked(&self, server: &ServerConfig) -> Result<Option<String>> {
        let (_, service) = self.require_service(Service::Api)?;
        info!(client_id = %service.client_id, "Access token revoked; attempting refresh");

        let refreshed = match self.tokens.get(&server.issuer, &service.client_id) {
            Some(token) => self.refresh(server, &service, &token).await,
            None => Err(AuthError::TokenRevoked),
        };

        match refreshed {
            Ok(token) => Ok(Some(token.access_token)),
            Err(e) => {
                warn!(error = %e, "Refresh after revocation failed; logging out");
                self.logout()?;
                Ok(None)
            }
        }
    }

    /// Login state of the primary service, derived from the token store now.
    pub fn login_state(&self) -> LoginState {
        let Some(server) = self.config.current() else {
            return LoginState::LoggedOut;
        };
        let Some(service) = server.service(Service::Api) else {
            return LoginState::LoggedOut;
        };
        derive_login_state(
            &self.tokens.load(),
            &server.issuer,
            &service.client_id,
            self.clock.now_millis(),
            self.settings.clock_skew_ms(),
        )
    }

    /// Re-derive and publish the login state.
    pub fn refresh_login_state(&self) -> LoginState {
        let state = self.login_state();
        self.publish(state);
        state
    }

    pub fn subscribe(&self) -> watch::Receiver<LoginState> {
        self.state.subscribe()
    }

    /// Navigate to the application root.
    pub fn navigate_home(&self) -> Result<()> {
        let home = self
            .settings
            .app_origin
            .join("/")
            .map_err(|e| AuthError::Config(format!("invalid app origin: {e}")))?;
        self.navigator.assign(&home)
    }

    /// Re-derive login state whenever the token collection is written,
    /// including by other sessions sharing the storage.
    pub fn watch_storage(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut changes = self.storage.subscribe();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.key == TOKENS_STORAGE_KEY => {
                        let state = service.refresh_login_state();
                        debug!(?state, "Token store changed");
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Storage change feed lagged");
                        service.refresh_login_state();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Periodically fetch the primary access token so expiry and refresh
    /// happen without user action.
    pub fn spawn_refresh_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let period = self.settings.refresh_interval();

        info!(interval_secs = period.as_secs(), "Starting token refresh loop");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if service.config.current().is_none() {
                    continue;
                }
                if let Err(e) = service.get_access_token(Service::Api).await {
                    debug!(error = %e, "Background token check failed");
                }
            }
        })
    }

    fn is_fresh(&self, token: &StoredToken) -> bool {
        jwt::is_valid_with_skew(
            &token.access_token,
            self.clock.now_millis(),
            self.settings.clock_skew_ms(),
        )
    }

    async fn refresh(
        &self,
        server: &ServerConfig,
        service: &ServiceConfig,
        token: &StoredToken,
    ) -> Result<StoredToken> {
        let refresh_token = token
            .refresh_token()
            .ok_or(AuthError::NoRefreshToken)?;

        let response = self
            .oauth
            .refresh_access_token(RefreshGrant {
                token_endpoint: server.token_endpoint.clone(),
                client_id: service.client_id.clone(),
                refresh_token: refresh_token.to_string(),
            })
            .await?;

        let refreshed = token.apply_refresh(response, self.clock.now());
        self.tokens.upsert(refreshed.clone())?;
        debug!(client_id = %service.client_id, expires_at = %refreshed.expires_at, "Access token refreshed");
        Ok(refreshed)
    }

    fn require_server(&self) -> Result<Arc<ServerConfig>> {
        self.config
            .current()
            .ok_or_else(|| AuthError::BackendNotConfigured("no backend connected".to_string()))
    }

    fn require_service(&self, service: Service) -> Result<(Arc<ServerConfig>, ServiceConfig)> {
        let server = self.require_server()?;
        let config = server
            .service(service)
            .cloned()
            .ok_or_else(|| AuthError::BackendNotConfigured(format!("no {service} client")))?;
        Ok((server, config))
    }

    fn publish(&self, state: LoginState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}

/// Builder for [`AuthService`]
pub struct AuthServiceBuilder {
    settings: AuthSettings,
    config: Option<Arc<dyn ServerConfigSource>>,
    oauth: Option<Arc<dyn OAuthClientTrait>>,
    navigator: Option<Arc<dyn Navigator>>,
    storage: Option<Arc<dyn KeyValueStorage>>,
    frame: Option<Arc<dyn SilentAuthFrame>>,
    clock: Arc<dyn Clock>,
}

impl AuthServiceBuilder {
    pub fn new(settings: AuthSettings) -> Self {
        Self {
            settings,
            config: None,
            oauth: None,
            navigator: None,
            storage: None,
            frame: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_config_source(mut self, config: Arc<dyn ServerConfigSource>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_oauth_client(mut self, oauth: Arc<dyn OAuthClientTrait>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_frame_host(mut self, frame: Arc<dyn SilentAuthFrame>) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// # Errors
    /// `AuthError::Config` naming the first missing collaborator.
    pub fn build(self) -> Result<AuthService> {
        let config = self.config.ok_or_else(|| missing("config source"))?;
        let oauth = self.oauth.ok_or_else(|| missing("OAuth client"))?;
        let navigator = self.navigator.ok_or_else(|| missing("navigator"))?;
        let storage = self.storage.ok_or_else(|| missing("storage"))?;
        let frame = self.frame.ok_or_else(|| missing("frame host"))?;
        self.settings.redirect_uri()?;

        let settings = Arc::new(self.settings);
        let tokens = TokenStore::new(Arc::clone(&storage));
        let pending = PendingAuthStore::new(Arc::clone(&storage));
        let silent = SilentReauthEngine::new(
            frame,
            Arc::clone(&oauth),
            tokens.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&settings),
        );
        let (state, _) = watch::channel(LoginState::LoggedOut);

        let service = AuthService {
            config,
            oauth,
            navigator,
            storage,
            tokens,
            pending,
            silent,
            clock: self.clock,
            settings,
            state,
        };
        service.refresh_login_state();
        Ok(service)
    }
}

fn missing(what: &str) -> AuthError {
    AuthError::Config(format!("AuthService requires a {what}"))
}
