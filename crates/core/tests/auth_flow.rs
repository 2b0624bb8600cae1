//! Integration tests for the interactive auth flow

mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aiza_common::time::Clock;
use aiza_core::testing::{token_response, TEST_ISSUER};
use aiza_core::{
    CallbackOutcome, CallbackPage, CallbackParams, KeyValueStorage, MemoryStorage, TokenStore,
};
use aiza_domain::constants::PENDING_AUTH_STORAGE_KEY;
use aiza_domain::{
    AuthError, BackendUserInfo, LoginState, OAuthIdentity, OAuthUserInfo, PendingAuth, Service,
};
use support::{Harness, APP_ORIGIN};
use url::Url;

fn query(url: &Url) -> HashMap<String, String> {
    url.query_pairs().into_owned().collect()
}

fn pending(storage: &MemoryStorage) -> Option<PendingAuth> {
    storage
        .get(PENDING_AUTH_STORAGE_KEY)
        .unwrap()
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

/// Validates that `login` persists the pending record before navigating.
///
/// Assertions:
/// - The navigator received exactly the returned authorization URL.
/// - The pending record is tagged `api` and its verifier hashes to the
///   challenge sent.
#[tokio::test]
async fn test_login_persists_pending_auth_and_navigates() {
    let h = Harness::new();

    let url = h.auth.login().unwrap();
    assert_eq!(h.navigator.visits(), vec![url.clone()]);

    let params = query(&url);
    assert_eq!(url.path(), "/oauth2/authorize");
    assert_eq!(params["client_id"], "api-client");
    assert_eq!(params["code_challenge_method"], "S256");

    let record = pending(&h.storage).expect("pending auth should be stored");
    assert_eq!(record.service, Service::Api);
    assert_eq!(record.server_id, "localhost:8080");
    assert_eq!(record.client_id, "api-client");
    assert_eq!(record.code_verifier.len(), 40);
    assert_eq!(aiza_common::auth::challenge(&record.code_verifier), params["code_challenge"]);
}

/// Validates login and logout without a connected backend.
///
/// Assertions:
/// - Both fail with `BackendNotConfigured`.
/// - Nothing is navigated to.
#[tokio::test]
async fn test_login_requires_backend() {
    let h = Harness::new();
    h.registry.disconnect();

    assert!(matches!(h.auth.login(), Err(AuthError::BackendNotConfigured(_))));
    assert!(matches!(h.auth.logout(), Err(AuthError::BackendNotConfigured(_))));
    assert!(matches!(
        h.auth.get_access_token(Service::Api).await,
        Err(AuthError::BackendNotConfigured(_))
    ));
    assert!(h.navigator.visits().is_empty());
}

/// Validates exactly-once consumption of the pending record.
///
/// Assertions:
/// - The first callback exchanges the code with the stored verifier.
/// - The second callback fails with `NoPendingAuth` and makes no request.
#[tokio::test]
async fn test_callback_twice_fails_with_no_pending_auth() {
    let h = Harness::new();
    let mut state = h.auth.subscribe();
    assert_eq!(*state.borrow_and_update(), LoginState::LoggedOut);

    h.auth.login().unwrap();
    let verifier = pending(&h.storage).unwrap().code_verifier;
    h.oauth.push_exchange(Ok(token_response("api-client", h.now_secs(), 3600, Some("r1"))));

    let token = h.auth.handle_oauth_callback("code-1").await.unwrap();
    assert_eq!(token.refresh_token(), Some("r1"));
    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), LoginState::LoggedIn);

    let second = h.auth.handle_oauth_callback("code-1").await;
    assert_eq!(second.unwrap_err(), AuthError::NoPendingAuth);

    let exchanges = h.oauth.exchanges();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].code, "code-1");
    assert_eq!(exchanges[0].code_verifier, verifier);
    assert_eq!(exchanges[0].client_id, "api-client");
    assert_eq!(exchanges[0].redirect_uri.as_str(), "http://localhost:3000/cognito_redirect");
}

/// Validates that a failed exchange still consumes the pending record.
///
/// Assertions:
/// - The error from the token endpoint is surfaced.
/// - Login state stays logged out and the pending record is gone.
#[tokio::test]
async fn test_failed_exchange_surfaces_error() {
    let h = Harness::new();
    h.auth.login().unwrap();

    let err = h.auth.handle_oauth_callback("bad-code").await.unwrap_err();
    assert!(matches!(err, AuthError::TokenExchangeFailed { status: Some(400), .. }));
    assert_eq!(h.auth.login_state(), LoginState::LoggedOut);
    assert!(pending(&h.storage).is_none());
}

/// Validates the cached-then-refreshed access token scenario.
///
/// Assertions:
/// - Right after the exchange the cached token is returned without a
///   network call.
/// - Past expiry exactly one refresh POST is made and its token returned.
/// - The stored record has a new `expires_at` and keeps the refresh token.
#[tokio::test]
async fn test_expired_token_is_refreshed_once() {
    let h = Harness::new();
    h.auth.login().unwrap();
    h.oauth.push_exchange(Ok(token_response("api-client", h.now_secs(), 3600, Some("r1"))));
    let issued = h.auth.handle_oauth_callback("code").await.unwrap();

    let cached = h.auth.get_access_token(Service::Api).await.unwrap();
    assert_eq!(cached.as_deref(), Some(issued.access_token.as_str()));
    assert_eq!(h.oauth.refresh_count(), 0);
    assert_eq!(h.oauth.exchange_count(), 1);

    h.clock.advance(Duration::from_secs(3601));
    let mut refreshed = token_response("api-client", h.now_secs(), 3600, None);
    refreshed.id_token = None;
    h.oauth.push_refresh(Ok(refreshed.clone()));

    let fresh = h.auth.get_access_token(Service::Api).await.unwrap();
    assert_eq!(fresh.as_deref(), Some(refreshed.access_token.as_str()));
    assert_eq!(h.oauth.refresh_count(), 1);
    assert_eq!(h.oauth.refreshes()[0].refresh_token, "r1");

    let stored = h.stored("api-client").unwrap();
    assert_eq!(stored.expires_at, h.clock.now() + chrono::Duration::seconds(3600));
    assert_eq!(stored.refresh_token(), Some("r1"));
    assert_eq!(stored.id_token, issued.id_token);
    assert_eq!(h.tokens().load().len(), 1);

    let again = h.auth.get_access_token(Service::Api).await.unwrap();
    assert_eq!(again, fresh);
    assert_eq!(h.oauth.refresh_count(), 1);
    assert_eq!(h.auth.login_state(), LoginState::LoggedIn);
}

/// Validates recovery from an irrecoverable refresh failure.
///
/// Assertions:
/// - `get_access_token` resolves to `None` rather than an error.
/// - The stale record is deleted and the session reports logged out.
#[tokio::test]
async fn test_refresh_failure_deletes_token() {
    let h = Harness::new();
    h.store_token("api-client", 60, Some("r1"));
    let state = h.auth.subscribe();
    h.auth.refresh_login_state();
    assert_eq!(*state.borrow(), LoginState::LoggedIn);

    h.clock.advance(Duration::from_secs(61));
    h.oauth.push_refresh(Err(AuthError::TokenExchangeFailed {
        status: Some(400),
        message: "invalid_grant".into(),
    }));

    assert_eq!(h.auth.get_access_token(Service::Api).await.unwrap(), None);
    assert!(h.stored("api-client").is_none());
    assert_eq!(*state.borrow(), LoginState::LoggedOut);
}

/// Validates that an expired token without a refresh token is discarded.
#[tokio::test]
async fn test_expired_token_without_refresh_token_is_discarded() {
    let h = Harness::new();
    h.store_token("api-client", 60, None);
    h.clock.advance(Duration::from_secs(60));

    assert_eq!(h.auth.get_access_token(Service::Api).await.unwrap(), None);
    assert_eq!(h.oauth.refresh_count(), 0);
    assert!(h.stored("api-client").is_none());
}

/// Validates `logout` with no stored token.
///
/// Assertions:
/// - No error is raised.
/// - The end-session URL carries `client_id` and the app origin.
#[tokio::test]
async fn test_logout_without_token_still_navigates() {
    let h = Harness::new();

    let url = h.auth.logout().unwrap();
    assert_eq!(h.navigator.last(), Some(url.clone()));
    assert_eq!(url.path(), "/logout");

    let params = query(&url);
    assert_eq!(params["client_id"], "api-client");
    assert_eq!(params["logout_uri"], APP_ORIGIN);
}

/// Validates that `logout` deletes only the primary token.
#[tokio::test]
async fn test_logout_deletes_primary_token() {
    let h = Harness::new();
    h.store_token("api-client", 3600, Some("r1"));
    h.store_token("analytics-client", 3600, None);
    assert_eq!(h.auth.refresh_login_state(), LoginState::LoggedIn);

    h.auth.logout().unwrap();

    assert!(h.stored("api-client").is_none());
    assert!(h.stored("analytics-client").is_some());
    assert_eq!(*h.auth.subscribe().borrow(), LoginState::LoggedOut);
}

/// Validates userinfo retrieval and revoked-token recovery.
///
/// Assertions:
/// - A valid token yields the userinfo document.
/// - A revoked token whose refresh fails logs the session out and yields
///   `None`.
#[tokio::test]
async fn test_user_info_logs_out_when_revoked() {
    let h = Harness::new();
    h.store_token("api-client", 3600, Some("r1"));

    let info = OAuthUserInfo {
        sub: "user-1".into(),
        email: Some("user@example.com".into()),
        email_verified: Some(true),
        name: None,
        username: None,
        phone_number: None,
        phone_number_verified: None,
    };
    h.oauth.push_user_info(Ok(Some(info.clone())));
    assert_eq!(h.auth.user_info().await.unwrap(), Some(info));

    h.oauth.push_user_info(Err(AuthError::TokenRevoked));
    assert_eq!(h.auth.user_info().await.unwrap(), None);
    assert_eq!(h.oauth.refresh_count(), 1);
    assert!(h.stored("api-client").is_none());
    assert_eq!(h.navigator.last().map(|u| u.path().to_string()).as_deref(), Some("/logout"));
}

/// Validates userinfo after a revoked token is refreshed successfully.
#[tokio::test]
async fn test_user_info_retries_after_refresh() {
    let h = Harness::new();
    h.store_token("api-client", 3600, Some("r1"));
    h.oauth.push_user_info(Err(AuthError::TokenRevoked));
    h.oauth.push_refresh(Ok(token_response("api-client", h.now_secs() + 1, 3600, None)));
    h.oauth.push_user_info(Ok(Some(OAuthUserInfo {
        sub: "user-1".into(),
        email: None,
        email_verified: None,
        name: None,
        username: None,
        phone_number: None,
        phone_number_verified: None,
    })));

    let info = h.auth.user_info().await.unwrap();
    assert_eq!(info.map(|i| i.sub).as_deref(), Some("user-1"));
    assert_eq!(h.oauth.user_info_count(), 2);
    assert!(h.navigator.visits().is_empty());
}

/// Validates that an unavailable userinfo endpoint is not an error.
#[tokio::test]
async fn test_user_info_unavailable_is_none() {
    let h = Harness::new();
    h.store_token("api-client", 3600, Some("r1"));
    h.oauth.push_user_info(Ok(None));

    assert_eq!(h.auth.user_info().await.unwrap(), None);
    assert_eq!(h.oauth.refresh_count(), 0);
    assert!(h.stored("api-client").is_some());
}

fn backend_account() -> BackendUserInfo {
    BackendUserInfo {
        id: "acc-1".into(),
        created: "2024-01-01T00:00:00Z".into(),
        modified: "2024-01-01T00:00:00Z".into(),
        oauth_id: OAuthIdentity { issuer: TEST_ISSUER.into(), subject: "user-1".into() },
    }
}

/// Validates backend account retrieval and revoked-token recovery.
///
/// Assertions:
/// - A revoked token is refreshed and the fetch retried once.
/// - When the refresh fails the session is logged out.
#[tokio::test]
async fn test_backend_user_info_recovers_revoked_token() {
    let h = Harness::new();
    h.store_token("api-client", 3600, Some("r1"));
    h.oauth.push_backend_user_info(Err(AuthError::TokenRevoked));
    h.oauth.push_refresh(Ok(token_response("api-client", h.now_secs() + 1, 3600, None)));
    h.oauth.push_backend_user_info(Ok(Some(backend_account())));

    assert_eq!(h.auth.backend_user_info().await.unwrap(), Some(backend_account()));
    assert_eq!(h.oauth.backend_user_info_count(), 2);
    assert_eq!(h.oauth.refresh_count(), 1);

    h.oauth.push_backend_user_info(Err(AuthError::TokenRevoked));
    assert_eq!(h.auth.backend_user_info().await.unwrap(), None);
    assert_eq!(h.oauth.refresh_count(), 2);
    assert!(h.stored("api-client").is_none());
    assert_eq!(h.auth.login_state(), LoginState::LoggedOut);
}

/// Validates that no backend account is fetched without a session.
#[tokio::test]
async fn test_backend_user_info_without_session() {
    let h = Harness::new();

    assert_eq!(h.auth.backend_user_info().await.unwrap(), None);
    assert_eq!(h.oauth.backend_user_info_count(), 0);
}

/// Validates the top-level callback page.
///
/// Assertions:
/// - The code is exchanged once and the window goes to the app root.
/// - A second load of the same page does not exchange again.
#[tokio::test]
async fn test_top_level_callback_exchanges_once_and_goes_home() {
    let h = Harness::new();
    h.auth.login().unwrap();
    h.oauth.push_exchange(Ok(token_response("api-client", h.now_secs(), 3600, None)));

    let page = CallbackPage::top_level(h.auth.clone());
    let redirect = Url::parse("http://localhost:3000/cognito_redirect?code=abc").unwrap();

    let outcome = page.handle(CallbackParams::from_url(&redirect)).await.unwrap();
    assert_eq!(outcome, CallbackOutcome::SignedIn);
    assert_eq!(h.navigator.last().map(|u| u.to_string()).as_deref(), Some("http://localhost:3000/"));

    let again = page.handle(CallbackParams::from_url(&redirect)).await.unwrap();
    assert_eq!(again, CallbackOutcome::AlreadyHandled);
    assert_eq!(h.oauth.exchange_count(), 1);
}

/// Validates that the top-level page navigates home even when the
/// exchange fails.
#[tokio::test]
async fn test_top_level_callback_goes_home_on_failure() {
    let h = Harness::new();
    let page = CallbackPage::top_level(h.auth.clone());

    let outcome = page
        .handle(CallbackParams { code: Some("abc".into()), error: None, state: None })
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Failed(AuthError::NoPendingAuth));
    assert_eq!(h.navigator.visits().len(), 1);

    let denied = CallbackPage::top_level(h.auth.clone())
        .handle(CallbackParams { code: None, error: Some("access_denied".into()), state: None })
        .await
        .unwrap();
    assert_eq!(denied, CallbackOutcome::Denied { error: Some("access_denied".into()) });
    assert_eq!(h.navigator.visits().len(), 2);
}

/// Validates a top-level redirect that carries no code.
///
/// Assertions:
/// - Nothing is exchanged and the pending login is left in place.
/// - The window still goes to the application root.
#[tokio::test]
async fn test_top_level_callback_without_code_goes_home() {
    let h = Harness::new();
    h.auth.login().unwrap();

    let page = CallbackPage::top_level(h.auth.clone());
    let redirect = Url::parse("http://localhost:3000/cognito_redirect").unwrap();
    let outcome = page.handle(CallbackParams::from_url(&redirect)).await.unwrap();

    assert_eq!(outcome, CallbackOutcome::Denied { error: None });
    assert_eq!(h.oauth.exchange_count(), 0);
    assert!(pending(&h.storage).is_some());
    assert_eq!(h.navigator.last().map(|u| u.to_string()).as_deref(), Some("http://localhost:3000/"));
    assert_eq!(h.navigator.visits().len(), 2);
}

/// Validates cross-session observation of the token store.
///
/// Assertions:
/// - A token written by another handle on the same storage flips the
///   published state to logged in.
#[tokio::test]
async fn test_storage_changes_rederive_login_state() {
    let h = Harness::new();
    let watcher = h.auth.watch_storage();
    let mut state = h.auth.subscribe();
    assert_eq!(*state.borrow_and_update(), LoginState::LoggedOut);

    let other_tab = TokenStore::new(Arc::new((*h.storage).clone()));
    other_tab
        .store_response(token_response("api-client", h.now_secs(), 3600, None), h.clock.now())
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), state.changed()).await.unwrap().unwrap();
    assert_eq!(*state.borrow(), LoginState::LoggedIn);
    assert_eq!(other_tab.load().len(), 1);
    assert!(other_tab.get(TEST_ISSUER, "api-client").is_some());

    watcher.abort();
}

/// Validates that the background loop refreshes an expired token.
#[tokio::test(start_paused = true)]
async fn test_refresh_loop_refreshes_expired_token() {
    let h = Harness::new();
    h.store_token("api-client", 60, Some("r1"));
    h.clock.advance(Duration::from_secs(120));
    h.oauth.push_refresh(Ok(token_response("api-client", h.now_secs(), 3600, None)));

    let task = h.auth.spawn_refresh_loop();
    for _ in 0..10 {
        if h.oauth.refresh_count() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert_eq!(h.oauth.refresh_count(), 1);
    assert_eq!(h.auth.login_state(), LoginState::LoggedIn);
    task.abort();
}
