//! OAuth 2.0 token and userinfo endpoint client
//!
//! Token requests are `application/x-www-form-urlencoded` POSTs (RFC 6749
//! §4.1.3 and §6). Error bodies follow RFC 6749 §5.2 when the provider
//! sends one.

use std::time::Duration;

use aiza_core::{CodeExchange, OAuthClientTrait, RefreshGrant};
use aiza_domain::{AuthError, BackendUserInfo, OAuthUserInfo, Result, TokenResponse};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// RFC 6749 §5.2 error body.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// reqwest-backed [`OAuthClientTrait`].
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client: Client,
}

impl OAuthClient {
    /// Client with a 30 second request timeout.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn post_token_form(&self, endpoint: &Url, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let grant_type = form.iter().find(|(k, _)| *k == "grant_type").map_or("", |(_, v)| *v);
        debug!(%endpoint, grant_type, "POST token endpoint");

        let response = self
            .client
            .post(endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::transport(e.to_string()))?;

        let status = response.status();
        debug!(%endpoint, %status, "Token endpoint responded");
        if !status.is_success() {
            return Err(exchange_failure(status, response).await);
        }

        response.json::<TokenResponse>().await.map_err(|e| AuthError::TokenExchangeFailed {
            status: Some(status.as_u16()),
            message: format!("invalid token response: {e}"),
        })
    }

    /// GET a bearer-authenticated JSON document.
    ///
    /// `401` is `TokenRevoked`; any other non-2xx or an unparsable body
    /// means the document is unavailable.
    async fn get_bearer_json<T: DeserializeOwned + Send>(
        &self,
        endpoint: &Url,
        access_token: &str,
    ) -> Result<Option<T>> {
        let response = self
            .client
            .get(endpoint.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::TokenRevoked);
        }
        if !status.is_success() {
            warn!(%endpoint, %status, "Profile document unavailable");
            return Ok(None);
        }

        match response.json::<T>().await {
            Ok(document) => Ok(Some(document)),
            Err(e) => {
                warn!(%endpoint, error = %e, "Profile document could not be parsed");
                Ok(None)
            }
        }
    }
}

async fn exchange_failure(status: StatusCode, response: Response) -> AuthError {
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<OAuthErrorBody>(&body) {
        Ok(OAuthErrorBody { error, error_description: Some(description) }) => {
            format!("{error}: {description}")
        }
        Ok(OAuthErrorBody { error, error_description: None }) => error,
        Err(_) if body.is_empty() => status.canonical_reason().unwrap_or("error").to_string(),
        Err(_) => body,
    };
    AuthError::TokenExchangeFailed { status: Some(status.as_u16()), message }
}

#[async_trait]
impl OAuthClientTrait for OAuthClient {
    async fn exchange_code_for_tokens(&self, request: CodeExchange) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", request.code.as_str()),
            ("client_id", request.client_id.as_str()),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("code_verifier", request.code_verifier.as_str()),
        ];
        self.post_token_form(&request.token_endpoint, &form).await
    }

    async fn refresh_access_token(&self, request: RefreshGrant) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", request.client_id.as_str()),
            ("refresh_token", request.refresh_token.as_str()),
        ];
        self.post_token_form(&request.token_endpoint, &form).await
    }

    async fn fetch_user_info(
        &self,
        userinfo_endpoint: &Url,
        access_token: &str,
    ) -> Result<Option<OAuthUserInfo>> {
        self.get_bearer_json(userinfo_endpoint, access_token).await
    }

    async fn fetch_backend_user_info(
        &self,
        backend_url: &Url,
        access_token: &str,
    ) -> Result<Option<BackendUserInfo>> {
        let endpoint = accounts_me(backend_url)?;
        self.get_bearer_json(&endpoint, access_token).await
    }
}

/// `{backend_url}/accounts/me`, keeping any base path of the backend.
fn accounts_me(backend_url: &Url) -> Result<Url> {
    let mut endpoint = backend_url.clone();
    endpoint
        .path_segments_mut()
        .map_err(|()| AuthError::Config(format!("backend URL cannot be a base: {backend_url}")))?
        .pop_if_empty()
        .extend(["accounts", "me"]);
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn endpoint(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{p}", server.uri())).unwrap()
    }

    fn exchange(server: &MockServer) -> CodeExchange {
        CodeExchange {
            token_endpoint: endpoint(server, "/oauth2/token"),
            client_id: "api-client".into(),
            code: "auth-code".into(),
            code_verifier: "verifier123".into(),
            redirect_uri: Url::parse("http://localhost:3000/cognito_redirect").unwrap(),
        }
    }

    #[tokio::test]
    async fn exchange_posts_authorization_code_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("client_id=api-client"))
            .and(body_string_contains("code_verifier=verifier123"))
            .and(body_string_contains(
                "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcognito_redirect",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a.b.c",
                "id_token": "i.d.t",
                "refresh_token": "r1",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OAuthClient::new().unwrap();
        let response = client.exchange_code_for_tokens(exchange(&server)).await.unwrap();

        assert_eq!(response.access_token, "a.b.c");
        assert_eq!(response.refresh_token.as_deref(), Some("r1"));
        assert_eq!(response.expires_in, 3600);
    }

    #[tokio::test]
    async fn non_success_maps_to_exchange_failure_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "code expired"
            })))
            .mount(&server)
            .await;

        let err = OAuthClient::new().unwrap().exchange_code_for_tokens(exchange(&server)).await.unwrap_err();

        assert_eq!(
            err,
            AuthError::TokenExchangeFailed {
                status: Some(400),
                message: "invalid_grant: code expired".into()
            }
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn refresh_posts_refresh_token_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r1"))
            .and(body_string_contains("client_id=api-client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new.access.token",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = OAuthClient::new()
            .unwrap()
            .refresh_access_token(RefreshGrant {
                token_endpoint: endpoint(&server, "/oauth2/token"),
                client_id: "api-client".into(),
                refresh_token: "r1".into(),
            })
            .await
            .unwrap();

        assert_eq!(response.access_token, "new.access.token");
        assert!(response.refresh_token.is_none());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_retryable_transport_failure() {
        let mut request = exchange(&MockServer::start().await);
        request.token_endpoint = Url::parse("http://127.0.0.1:9/oauth2/token").unwrap();

        let err = OAuthClient::new().unwrap().exchange_code_for_tokens(request).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExchangeFailed { status: None, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn user_info_uses_bearer_and_maps_401_to_revoked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/userInfo"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "user-1",
                "email": "user@example.com",
                "email_verified": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oauth2/userInfo"))
            .and(header("authorization", "Bearer revoked"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = OAuthClient::new().unwrap();
        let userinfo = endpoint(&server, "/oauth2/userInfo");

        let info = client.fetch_user_info(&userinfo, "good").await.unwrap().unwrap();
        assert_eq!(info.sub, "user-1");
        assert_eq!(info.email_verified, Some(true));

        let err = client.fetch_user_info(&userinfo, "revoked").await.unwrap_err();
        assert_eq!(err, AuthError::TokenRevoked);
    }

    #[tokio::test]
    async fn user_info_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/userInfo"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let info = OAuthClient::new()
            .unwrap()
            .fetch_user_info(&endpoint(&server, "/oauth2/userInfo"), "good")
            .await
            .unwrap();

        assert!(info.is_none());
    }

    #[tokio::test]
    async fn backend_user_info_reads_accounts_me_under_base_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/accounts/me"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "acc-1",
                "created": "2024-01-01T00:00:00Z",
                "modified": "2024-02-01T00:00:00Z",
                "oauthId": { "issuer": "https://idp.example.com/pool", "subject": "user-1" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/accounts/me"))
            .and(header("authorization", "Bearer revoked"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = OAuthClient::new().unwrap();
        let backend = endpoint(&server, "/api/");

        let account = client.fetch_backend_user_info(&backend, "good").await.unwrap().unwrap();
        assert_eq!(account.id, "acc-1");
        assert_eq!(account.oauth_id.subject, "user-1");

        let err = client.fetch_backend_user_info(&backend, "revoked").await.unwrap_err();
        assert_eq!(err, AuthError::TokenRevoked);
    }

    #[test]
    fn accounts_me_appends_to_backend_path() {
        let bare = Url::parse("https://api.example.com").unwrap();
        assert_eq!(accounts_me(&bare).unwrap().as_str(), "https://api.example.com/accounts/me");

        let nested = Url::parse("https://example.com/api").unwrap();
        assert_eq!(accounts_me(&nested).unwrap().as_str(), "https://example.com/api/accounts/me");
    }
}
