//! Backend configuration types
//!
//! A `ServerConfig` is the resolved view of one backend: its OpenID endpoints
//! and the OAuth clients of the logical services it exposes. It is immutable
//! once resolved and replaced wholesale when the application switches backend.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::AuthError;

/// Logical service sharing the backend's identity provider.
///
/// Each service has its own OAuth client and therefore its own token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Primary API; owns the interactive session.
    Api,
    /// Secondary analytics service; obtained silently.
    Analytics,
}

impl Service {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Analytics => "analytics",
        }
    }

    /// Whether this service drives the interactive login/logout flow.
    #[must_use]
    pub fn is_primary(self) -> bool {
        matches!(self, Self::Api)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(Self::Api),
            "analytics" => Ok(Self::Analytics),
            other => Err(AuthError::Config(format!("unknown service: {other}"))),
        }
    }
}

/// One OAuth client scoped to one logical service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub client_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Base URL of the service's resource server.
    pub url: Url,
}

/// Resolved configuration of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Web origin the backend expects the application to be served from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<Url>,
    pub backend_url: Url,
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub end_session_endpoint: Url,
    pub userinfo_endpoint: Url,
    #[serde(default)]
    pub services: BTreeMap<Service, ServiceConfig>,
}

impl ServerConfig {
    /// Identifier of this backend (host and explicit port of its URL).
    #[must_use]
    pub fn server_id(&self) -> String {
        server_id_for(self.backend_url.as_str())
    }

    #[must_use]
    pub fn service(&self, service: Service) -> Option<&ServiceConfig> {
        self.services.get(&service)
    }

    /// Whether the backend advertises a web origin different from the one
    /// hosting the application.
    #[must_use]
    pub fn origin_mismatch(&self, app_origin: &Url) -> bool {
        self.web
            .as_ref()
            .is_some_and(|web| web.origin() != app_origin.origin())
    }
}

/// Derive the server id from a backend URL.
///
/// Returns `host[:port]`, or the input unchanged when it is not a valid URL.
#[must_use]
pub fn server_id_for(backend_url: &str) -> String {
    match Url::parse(backend_url) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => backend_url.to_string(),
        },
        Err(_) => backend_url.to_string(),
    }
}
