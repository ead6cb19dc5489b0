//! Health check and version endpoints
//!
//! Liveness only: the service is healthy while it runs, whether or not the backend answers.
//! Unreachable targets show up as `FAILURE`/`UNREACHABLE` statuses, not as an unhealthy service.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub timestamp: String,
    /// Operating mode
    pub mode: &'static str,
    pub channels: usize,
}

/// Liveness probe
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.uptime().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        channels: state.channels.connection_count(),
    };

    json_response(StatusCode::OK, &response)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub build_time: &'static str,
}

/// Build metadata for deployment verification
pub fn version_info() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &VersionInfo {
            version: env!("CARGO_PKG_VERSION"),
            git_commit: env!("GIT_COMMIT_SHORT"),
            build_time: env!("BUILD_TIMESTAMP"),
        },
    )
}
