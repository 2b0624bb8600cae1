//! Shared test harness for `aiza-core` integration tests.
//!
//! Wires an `AuthService` to in-memory storage, a mock clock and scripted
//! collaborators so tests can focus on behaviour instead of boilerplate.

#![allow(dead_code)]

use std::sync::Arc;

use aiza_common::testing::MockClock;
use aiza_common::time::Clock;
use aiza_core::testing::{
    sample_server_config, token_response, FrameScript, MockOAuthClient, RecordingNavigator,
    ScriptedFrameHost, TEST_ISSUER,
};
use aiza_core::{AuthService, BackendRegistry, MemoryStorage, TokenStore};
use aiza_domain::{AuthSettings, StoredToken};

pub const NOW_MS: i64 = 1_700_000_000_000;
pub const APP_ORIGIN: &str = "http://localhost:3000";

pub struct Harness {
    pub auth: Arc<AuthService>,
    pub registry: Arc<BackendRegistry>,
    pub oauth: Arc<MockOAuthClient>,
    pub navigator: Arc<RecordingNavigator>,
    pub frames: Arc<ScriptedFrameHost>,
    pub storage: Arc<MemoryStorage>,
    pub clock: MockClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_script(FrameScript::NoReply)
    }

    pub fn with_script(script: FrameScript) -> Self {
        let registry = Arc::new(BackendRegistry::with_config(sample_server_config()));
        let oauth = Arc::new(MockOAuthClient::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let frames = Arc::new(ScriptedFrameHost::new(APP_ORIGIN, script));
        let storage = Arc::new(MemoryStorage::new());
        let clock = MockClock::at_millis(NOW_MS);

        let auth = AuthService::builder(AuthSettings::default())
            .with_config_source(registry.clone())
            .with_oauth_client(oauth.clone())
            .with_navigator(navigator.clone())
            .with_storage(storage.clone())
            .with_frame_host(frames.clone())
            .with_clock(Arc::new(clock.clone()))
            .build()
            .expect("harness should build");

        Self { auth: Arc::new(auth), registry, oauth, navigator, frames, storage, clock }
    }

    pub fn now_secs(&self) -> i64 {
        self.clock.now_millis() / 1000
    }

    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(self.storage.clone())
    }

    /// Store a token for `client_id` valid for `expires_in` seconds from now.
    pub fn store_token(&self, client_id: &str, expires_in: i64, refresh: Option<&str>) -> StoredToken {
        let response = token_response(client_id, self.now_secs(), expires_in, refresh);
        self.tokens().store_response(response, self.clock.now()).expect("token should store")
    }

    pub fn stored(&self, client_id: &str) -> Option<StoredToken> {
        self.tokens().get(TEST_ISSUER, client_id)
    }
}
