//! Ambient execution context for probe tasks
//!
//! A probe runs detached from the connection that asked for it, yet its outbound calls must be
//! attributed to the asker's tenant and session. The context is captured as a plain value when
//! the probe is scheduled and attached only for the lifetime of the probe future through a
//! task-local scope. Leaving the scope (normally, by error, or by unwinding) restores the
//! previous value, so nothing lingers on a pooled worker.

use serde::Serialize;
use std::future::Future;

/// Tenant domain used when a request does not name one
pub const DEFAULT_DOMAIN: &str = "Master";

/// Header carrying the tenant domain on inbound and outbound requests
pub const DOMAIN_HEADER: &str = "X-Tenant-Domain";

tokio::task_local! {
    static CURRENT: ProbeContext;
}

/// Who a probe runs on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeContext {
    /// Tenant domain
    pub domain: String,
    /// Owning session, if the channel is bound to one
    pub session_id: Option<String>,
    /// Bearer token forwarded to the backend
    #[serde(skip_serializing)]
    pub bearer_token: Option<String>,
}

impl Default for ProbeContext {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            session_id: None,
            bearer_token: None,
        }
    }
}

impl ProbeContext {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Context attached to the running task, if any
    pub fn current() -> Option<ProbeContext> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// Context attached to the running task, or the default one
    pub fn current_or_default() -> ProbeContext {
        Self::current().unwrap_or_default()
    }

    /// Run `fut` with this context attached. Detached when the future completes or is dropped.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, fut).await
    }
}
