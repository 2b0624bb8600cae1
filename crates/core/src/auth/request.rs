use aiza_domain::{AuthSettings, Result, ServerConfig, ServiceConfig};
use url::Url;

/// Build the authorization endpoint URL for `service`.
///
/// `state` is set for silent attempts, which also carry `prompt=none`.
pub(crate) fn authorization_url(
    server: &ServerConfig,
    service: &ServiceConfig,
    settings: &AuthSettings,
    code_challenge: &str,
    state: Option<&str>,
) -> Result<Url> {
    let redirect_uri = settings.redirect_uri()?;
    let scopes = if service.scopes.is_empty() { &settings.default_scopes } else { &service.scopes };

    let mut url = server.authorization_endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &service.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", aiza_domain::constants::CODE_CHALLENGE_METHOD);
        if let Some(state) = state {
            query.append_pair("prompt", "none").append_pair("state", state);
        }
    }
    Ok(url)
}
