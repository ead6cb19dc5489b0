//! Directory and Prober collaborators
//!
//! The coordinator only knows the two traits. The REST implementations talk to the management
//! backend and carry the probe context (tenant domain, bearer token) on every call; they read it
//! from the task-local scope the coordinator attaches around the probe.

use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::context::{ProbeContext, DOMAIN_HEADER};
use super::TargetKind;
use crate::types::{Result, TopologyError};

/// Backend representation of a target, as returned by the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub kind: TargetKind,
    pub key: String,
    /// Raw backend document, posted back verbatim when probing
    pub body: serde_json::Value,
}

/// Resolves a target key to its descriptor
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    /// Fails with `NotFound` when the key is unknown to the backend
    async fn read(&self, kind: TargetKind, key: &str) -> Result<TargetDescriptor>;
}

/// Tests whether a target is reachable. Any timeout is the prober's own business.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn check(&self, descriptor: &TargetDescriptor) -> Result<bool>;
}

// ============================================================================
// REST implementations
// ============================================================================

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TopologyError::Config(format!("HTTP client: {e}")))
}

fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Attach the current probe context to an outbound request
fn with_context(builder: RequestBuilder) -> RequestBuilder {
    let ctx = ProbeContext::current_or_default();
    let builder = builder.header(DOMAIN_HEADER, ctx.domain);
    match ctx.bearer_token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

/// Directory backed by `GET {base}/{connectors|resources}/{key}`
#[derive(Clone)]
pub struct RestDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl RestDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: trim_base(base_url),
        })
    }

    fn url(&self, kind: TargetKind, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            kind.collection(),
            urlencoding::encode(key)
        )
    }
}

#[async_trait::async_trait]
impl Directory for RestDirectory {
    async fn read(&self, kind: TargetKind, key: &str) -> Result<TargetDescriptor> {
        let url = self.url(kind, key);
        debug!(kind = %kind, target = key, url = %url, "Directory lookup");

        let response = with_context(self.client.get(&url))
            .send()
            .await
            .map_err(|e| TopologyError::Lookup {
                target: key.to_string(),
                reason: e.to_string(),
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(TopologyError::NotFound(key.to_string())),
            status if !status.is_success() => Err(TopologyError::Lookup {
                target: key.to_string(),
                reason: format!("backend returned {status}"),
            }),
            _ => {
                let body = response.json::<serde_json::Value>().await.map_err(|e| {
                    TopologyError::Lookup {
                        target: key.to_string(),
                        reason: format!("invalid descriptor: {e}"),
                    }
                })?;
                Ok(TargetDescriptor {
                    kind,
                    key: key.to_string(),
                    body,
                })
            }
        }
    }
}

/// Backend answer to a connection check
#[derive(Debug, Deserialize)]
struct CheckResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Prober backed by `POST {base}/{connectors|resources}/check`
#[derive(Clone)]
pub struct RestProber {
    client: reqwest::Client,
    base_url: String,
}

impl RestProber {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

#[async_trait::async_trait]
impl Prober for RestProber {
    async fn check(&self, descriptor: &TargetDescriptor) -> Result<bool> {
        let url = format!("{}/{}/check", self.base_url, descriptor.kind.collection());
        let probe_err = |reason: String| TopologyError::Probe {
            target: descriptor.key.clone(),
            reason,
        };

        let response = with_context(self.client.post(&url))
            .json(&descriptor.body)
            .send()
            .await
            .map_err(|e| probe_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(probe_err(format!("backend returned {status}")));
        }

        let answer = response
            .json::<CheckResponse>()
            .await
            .map_err(|e| probe_err(format!("invalid check response: {e}")))?;

        debug!(
            kind = %descriptor.kind,
            target = %descriptor.key,
            success = answer.success,
            message = answer.message.as_deref().unwrap_or(""),
            "Backend connection check"
        );

        Ok(answer.success)
    }
}
