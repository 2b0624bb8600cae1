use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aiza_common::testing::unsigned_jwt;
use aiza_domain::{
    AuthError, BackendUserInfo, CallbackMessage, OAuthUserInfo, Result, ServerConfig, Service,
    ServiceConfig, TokenResponse,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::auth::callback::{CallbackPage, CallbackParams};
use crate::auth::ports::{
    CodeExchange, FrameMessage, FrameSession, Navigator, OAuthClientTrait, ParentRelay,
    RefreshGrant, SilentAuthFrame,
};

pub const TEST_ISSUER: &str = "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_test";

fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap_or_else(|e| panic!("invalid test URL {raw}: {e}"))
}

/// Backend with an `api` client (no scopes listed) and an `analytics`
/// client.
pub fn sample_server_config() -> ServerConfig {
    let mut services = BTreeMap::new();
    services.insert(
        Service::Api,
        ServiceConfig {
            client_id: "api-client".into(),
            scopes: Vec::new(),
            url: url("http://localhost:8080"),
        },
    );
    services.insert(
        Service::Analytics,
        ServiceConfig {
            client_id: "analytics-client".into(),
            scopes: vec!["openid".into(), "analytics/read".into()],
            url: url("http://localhost:8090"),
        },
    );

    ServerConfig {
        name: "test".into(),
        version: "1.0.0".into(),
        web: Some(url("http://localhost:3000")),
        backend_url: url("http://localhost:8080"),
        issuer: TEST_ISSUER.into(),
        authorization_endpoint: url("https://auth.example.com/oauth2/authorize"),
        token_endpoint: url("https://auth.example.com/oauth2/token"),
        end_session_endpoint: url("https://auth.example.com/logout"),
        userinfo_endpoint: url("https://auth.example.com/oauth2/userInfo"),
        services,
    }
}

/// Token endpoint response for `client_id`, expiring `expires_in` seconds
/// after `now_secs`.
pub fn token_response(
    client_id: &str,
    now_secs: i64,
    expires_in: i64,
    refresh_token: Option<&str>,
) -> TokenResponse {
    TokenResponse {
        access_token: unsigned_jwt(TEST_ISSUER, client_id, now_secs + expires_in),
        id_token: Some(format!("id-token-{client_id}")),
        expires_in,
        token_type: "Bearer".into(),
        refresh_token: refresh_token.map(str::to_string),
        scope: None,
    }
}

/// Scripted OAuth client recording every request.
///
/// Unscripted token requests fail with a `400`.
#[derive(Default)]
pub struct MockOAuthClient {
    exchange_responses: Mutex<VecDeque<Result<TokenResponse>>>,
    refresh_responses: Mutex<VecDeque<Result<TokenResponse>>>,
    user_info_responses: Mutex<VecDeque<Result<Option<OAuthUserInfo>>>>,
    backend_user_responses: Mutex<VecDeque<Result<Option<BackendUserInfo>>>>,
    exchanges: Mutex<Vec<CodeExchange>>,
    refreshes: Mutex<Vec<RefreshGrant>>,
    user_info_calls: AtomicUsize,
    backend_user_calls: AtomicUsize,
}

impl MockOAuthClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_exchange(&self, response: Result<TokenResponse>) {
        self.exchange_responses.lock().push_back(response);
    }

    pub fn push_refresh(&self, response: Result<TokenResponse>) {
        self.refresh_responses.lock().push_back(response);
    }

    pub fn push_user_info(&self, response: Result<Option<OAuthUserInfo>>) {
        self.user_info_responses.lock().push_back(response);
    }

    pub fn push_backend_user_info(&self, response: Result<Option<BackendUserInfo>>) {
        self.backend_user_responses.lock().push_back(response);
    }

    pub fn exchanges(&self) -> Vec<CodeExchange> {
        self.exchanges.lock().clone()
    }

    pub fn refreshes(&self) -> Vec<RefreshGrant> {
        self.refreshes.lock().clone()
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.lock().len()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.lock().len()
    }

    pub fn user_info_count(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }

    pub fn backend_user_info_count(&self) -> usize {
        self.backend_user_calls.load(Ordering::SeqCst)
    }
}

fn unscripted() -> AuthError {
    AuthError::TokenExchangeFailed { status: Some(400), message: "invalid_grant".into() }
}

#[async_trait]
impl OAuthClientTrait for MockOAuthClient {
    async fn exchange_code_for_tokens(&self, request: CodeExchange) -> Result<TokenResponse> {
        self.exchanges.lock().push(request);
        self.exchange_responses.lock().pop_front().unwrap_or_else(|| Err(unscripted()))
    }

    async fn refresh_access_token(&self, request: RefreshGrant) -> Result<TokenResponse> {
        self.refreshes.lock().push(request);
        self.refresh_responses.lock().pop_front().unwrap_or_else(|| Err(unscripted()))
    }

    async fn fetch_user_info(
        &self,
        _userinfo_endpoint: &Url,
        _access_token: &str,
    ) -> Result<Option<OAuthUserInfo>> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        self.user_info_responses.lock().pop_front().unwrap_or(Err(AuthError::TokenRevoked))
    }

    async fn fetch_backend_user_info(
        &self,
        _backend_url: &Url,
        _access_token: &str,
    ) -> Result<Option<BackendUserInfo>> {
        self.backend_user_calls.fetch_add(1, Ordering::SeqCst);
        self.backend_user_responses.lock().pop_front().unwrap_or(Err(AuthError::TokenRevoked))
    }
}

/// Navigator that records instead of navigating.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<Url>>,
}

impl RecordingNavigator {
    pub fn visits(&self) -> Vec<Url> {
        self.visits.lock().clone()
    }

    pub fn last(&self) -> Option<Url> {
        self.visits.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn assign(&self, url: &Url) -> Result<()> {
        self.visits.lock().push(url.clone());
        Ok(())
    }
}

/// Relay that records posted messages with their target origin.
#[derive(Debug, Default)]
pub struct RecordingRelay {
    posted: Mutex<Vec<(CallbackMessage, String)>>,
}

impl RecordingRelay {
    pub fn posted(&self) -> Vec<(CallbackMessage, String)> {
        self.posted.lock().clone()
    }
}

impl ParentRelay for RecordingRelay {
    fn post_message(&self, message: &CallbackMessage, target_origin: &str) -> Result<()> {
        self.posted.lock().push((message.clone(), target_origin.to_string()));
        Ok(())
    }
}

/// What the identity provider does with a silent request.
#[derive(Debug, Clone)]
pub enum FrameScript {
    /// Redirect back with this code and the request's state.
    Code(String),
    /// Redirect back with this error and the request's state.
    Error(String),
    /// Redirect back with this code but a different state.
    WrongState(String),
    /// A page on another origin posts a well-formed callback.
    ForeignOrigin(String),
    /// Never redirect back.
    NoReply,
}

/// Posts into a frame session the way `window.parent.postMessage` would.
struct SessionRelay {
    frame_origin: String,
    parent_origin: String,
    sender: mpsc::UnboundedSender<FrameMessage>,
}

impl ParentRelay for SessionRelay {
    fn post_message(&self, message: &CallbackMessage, target_origin: &str) -> Result<()> {
        if target_origin != self.parent_origin {
            return Ok(());
        }
        let data = serde_json::to_value(message)?;
        let _ = self.sender.send(FrameMessage { origin: self.frame_origin.clone(), data });
        Ok(())
    }
}

/// Simulated hidden-frame host.
///
/// Each mount answers per the current [`FrameScript`] by loading the real
/// callback page in embedded mode on a spawned task. Sessions stay open
/// until the engine drops them.
pub struct ScriptedFrameHost {
    app_origin: String,
    script: Mutex<FrameScript>,
    mounts: Mutex<Vec<Url>>,
    open: Mutex<Vec<mpsc::UnboundedSender<FrameMessage>>>,
    torn_down: Arc<AtomicUsize>,
}

impl ScriptedFrameHost {
    pub fn new(app_origin: impl Into<String>, script: FrameScript) -> Self {
        Self {
            app_origin: app_origin.into(),
            script: Mutex::new(script),
            mounts: Mutex::new(Vec::new()),
            open: Mutex::new(Vec::new()),
            torn_down: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_script(&self, script: FrameScript) {
        *self.script.lock() = script;
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.lock().len()
    }

    pub fn mounted_urls(&self) -> Vec<Url> {
        self.mounts.lock().clone()
    }

    /// Sessions dropped by their owner.
    pub fn torn_down(&self) -> usize {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn redirect(url: &Url, code: Option<&str>, error: Option<&str>, state: Option<&str>) -> Option<Url> {
        let mut redirect = url
            .query_pairs()
            .find(|(k, _)| k == "redirect_uri")
            .and_then(|(_, v)| Url::parse(&v).ok())?;
        {
            let mut query = redirect.query_pairs_mut();
            if let Some(code) = code {
                query.append_pair("code", code);
            }
            if let Some(error) = error {
                query.append_pair("error", error);
            }
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Some(redirect)
    }
}

#[async_trait]
impl SilentAuthFrame for ScriptedFrameHost {
    async fn mount(&self, url: Url) -> Result<FrameSession> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.mounts.lock().push(url.clone());
        self.open.lock().push(sender.clone());

        let state = url.query_pairs().find(|(k, _)| k == "state").map(|(_, v)| v.into_owned());
        let script = self.script.lock().clone();

        let (frame_origin, redirect) = match &script {
            FrameScript::Code(code) => {
                (self.app_origin.clone(), Self::redirect(&url, Some(code), None, state.as_deref()))
            }
            FrameScript::Error(error) => {
                (self.app_origin.clone(), Self::redirect(&url, None, Some(error), state.as_deref()))
            }
            FrameScript::WrongState(code) => {
                (self.app_origin.clone(), Self::redirect(&url, Some(code), None, Some("forged")))
            }
            FrameScript::ForeignOrigin(code) => (
                "https://evil.example.com".to_string(),
                Self::redirect(&url, Some(code), None, state.as_deref()),
            ),
            FrameScript::NoReply => (self.app_origin.clone(), None),
        };

        if let Some(redirect) = redirect {
            let relay = Arc::new(SessionRelay {
                frame_origin,
                parent_origin: self.app_origin.clone(),
                sender,
            });
            // A foreign page addresses the parent by its real origin too.
            let page = CallbackPage::embedded(relay, self.app_origin.clone());
            tokio::spawn(async move {
                let _ = page.handle(CallbackParams::from_url(&redirect)).await;
            });
        }

        let torn_down = Arc::clone(&self.torn_down);
        Ok(FrameSession::new(receiver, move || {
            torn_down.fetch_add(1, Ordering::SeqCst);
        }))
    }
}
