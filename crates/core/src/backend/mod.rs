//! Backend registry
//!
//! Holds the resolved configuration of the connected backend. Connecting to
//! another backend replaces it wholesale; readers keep whatever `Arc` they
//! already hold.

use std::sync::Arc;

use aiza_domain::{AuthSettings, ServerConfig};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::auth::ports::ServerConfigSource;

#[derive(Debug, Default)]
pub struct BackendRegistry {
    current: RwLock<Option<Arc<ServerConfig>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self { current: RwLock::new(Some(Arc::new(config))) }
    }

    /// Install `config` as the connected backend, returning the previous one.
    pub fn connect(&self, config: ServerConfig) -> Option<Arc<ServerConfig>> {
        info!(server_id = %config.server_id(), name = %config.name, "Connected backend");
        self.current.write().replace(Arc::new(config))
    }

    /// Same as [`connect`](Self::connect), warning when the backend expects
    /// the application on a different origin.
    pub fn connect_checked(
        &self,
        config: ServerConfig,
        settings: &AuthSettings,
    ) -> Option<Arc<ServerConfig>> {
        if config.origin_mismatch(&settings.app_origin) {
            warn!(
                server_id = %config.server_id(),
                expected = config.web.as_ref().map(|u| u.as_str()).unwrap_or_default(),
                actual = %settings.origin(),
                "Backend expects the application on a different origin"
            );
        }
        self.connect(config)
    }

    pub fn disconnect(&self) -> Option<Arc<ServerConfig>> {
        self.current.write().take()
    }
}

impl ServerConfigSource for BackendRegistry {
    fn current(&self) -> Option<Arc<ServerConfig>> {
        self.current.read().clone()
    }
}
