//! Navigator backed by the system browser.

use aiza_core::Navigator;
use aiza_domain::{AuthError, Result};
use tracing::{debug, warn};
use url::Url;

/// Opens navigation targets in the user's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowserNavigator;

impl SystemBrowserNavigator {
    pub fn new() -> Self {
        Self
    }
}

impl Navigator for SystemBrowserNavigator {
    fn assign(&self, url: &Url) -> Result<()> {
        // Query strings carry client ids and challenges; log the path only.
        debug!(host = url.host_str().unwrap_or_default(), path = url.path(), "Opening browser");
        open::that(url.as_str()).map_err(|e| {
            warn!(error = %e, "Failed to open system browser");
            AuthError::Navigation(format!("failed to open browser: {e}"))
        })
    }
}
