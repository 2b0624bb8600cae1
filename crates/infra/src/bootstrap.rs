//! Wiring of the production adapters into an [`AuthService`].

use std::sync::Arc;

use aiza_core::{AuthService, BackendRegistry, SilentAuthFrame};
use aiza_domain::{AppConfig, Result};
use tracing::info;

use crate::http::OAuthClient;
use crate::navigator::SystemBrowserNavigator;
use crate::storage::FileStorage;

/// Assembled authentication stack.
pub struct AuthStack {
    pub auth: Arc<AuthService>,
    /// Switch backends through this registry; the service reads it on every
    /// call.
    pub registry: Arc<BackendRegistry>,
    pub storage: FileStorage,
}

/// Build the authentication stack from configuration.
///
/// The silent-reauthentication frame host is supplied by the embedding
/// application since it owns the rendering surface.
///
/// # Errors
/// Returns an error if the storage directory cannot be created, the HTTP
/// client cannot be built, or the auth settings are invalid.
pub fn build_auth_stack(config: &AppConfig, frames: Arc<dyn SilentAuthFrame>) -> Result<AuthStack> {
    let storage = FileStorage::from_config(&config.storage)?;

    let registry = Arc::new(BackendRegistry::new());
    if let Some(backend) = config.backend.clone() {
        registry.connect_checked(backend, &config.auth);
    }

    let auth = AuthService::builder(config.auth.clone())
        .with_config_source(registry.clone())
        .with_oauth_client(Arc::new(OAuthClient::new()?))
        .with_navigator(Arc::new(SystemBrowserNavigator::new()))
        .with_storage(Arc::new(storage.clone()))
        .with_frame_host(frames)
        .build()?;

    info!(
        storage_dir = %storage.dir().display(),
        backend = config.backend.as_ref().map(|b| b.name.as_str()).unwrap_or("none"),
        "Auth stack ready"
    );

    Ok(AuthStack { auth: Arc::new(auth), registry, storage })
}
