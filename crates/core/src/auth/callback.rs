//! OAuth redirect page
//!
//! The redirect URI renders this page either as the top-level document,
//! where it completes the interactive login, or inside the hidden frame of a
//! silent attempt, where it only relays the result to its parent.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aiza_domain::{AuthError, CallbackMessage, Result};
use tracing::{info, warn};
use url::Url;

use super::ports::ParentRelay;
use super::service::AuthService;

/// Query parameters the identity provider appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
}

impl CallbackParams {
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Forwarded to the parent window.
    Relayed,
    /// Code exchanged and stored.
    SignedIn,
    /// The provider returned no code.
    Denied { error: Option<String> },
    /// The exchange was attempted and failed.
    Failed(AuthError),
    /// The page already handled a callback.
    AlreadyHandled,
}

enum FrameContext {
    TopLevel(Arc<AuthService>),
    Embedded { relay: Arc<dyn ParentRelay>, parent_origin: String },
}

pub struct CallbackPage {
    context: FrameContext,
    handled: AtomicBool,
}

impl CallbackPage {
    /// Page loaded as the top-level document.
    pub fn top_level(auth: Arc<AuthService>) -> Self {
        Self { context: FrameContext::TopLevel(auth), handled: AtomicBool::new(false) }
    }

    /// Page loaded inside a frame whose parent is `parent_origin`.
    pub fn embedded(relay: Arc<dyn ParentRelay>, parent_origin: impl Into<String>) -> Self {
        Self {
            context: FrameContext::Embedded { relay, parent_origin: parent_origin.into() },
            handled: AtomicBool::new(false),
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.context, FrameContext::Embedded { .. })
    }

    /// Handle the callback parameters.
    ///
    /// Embedded pages relay and stop. Top-level pages run the exchange at
    /// most once and then navigate to the application root whatever the
    /// outcome.
    ///
    /// # Errors
    /// Only relay or navigation failures are returned; exchange failures
    /// are reported as [`CallbackOutcome::Failed`].
    pub async fn handle(&self, params: CallbackParams) -> Result<CallbackOutcome> {
        match &self.context {
            FrameContext::Embedded { relay, parent_origin } => {
                let message = CallbackMessage::oauth_callback(params.code, params.error, params.state);
                relay.post_message(&message, parent_origin)?;
                Ok(CallbackOutcome::Relayed)
            }
            FrameContext::TopLevel(auth) => {
                if self.handled.swap(true, Ordering::SeqCst) {
                    return Ok(CallbackOutcome::AlreadyHandled);
                }

                let outcome = match params.code {
                    Some(code) => match auth.handle_oauth_callback(&code).await {
                        Ok(_) => {
                            info!("Interactive login completed");
                            CallbackOutcome::SignedIn
                        }
                        Err(e) => {
                            warn!(error = %e, kind = e.label(), "OAuth callback failed");
                            CallbackOutcome::Failed(e)
                        }
                    },
                    None => {
                        warn!(error = params.error.as_deref().unwrap_or("none"), "OAuth callback without code");
                        CallbackOutcome::Denied { error: params.error }
                    }
                };

                auth.navigate_home()?;
                Ok(outcome)
            }
        }
    }
}

impl fmt::Debug for CallbackPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackPage")
            .field("embedded", &self.is_embedded())
            .field("handled", &self.handled.load(Ordering::SeqCst))
            .finish()
    }
}
