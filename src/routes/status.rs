//! Runtime status endpoint
//!
//! Cache sizes, outstanding probes, pool activity and attached channels.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::server::AppState;
use crate::topology::CoordinatorStats;

/// Push channel stats
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    /// Attached push channels
    pub connected: usize,
    /// Connections superseded by a reconnect
    pub superseded: u64,
    /// Frames dispatched
    pub frames_handled: u64,
    /// Frames dropped as malformed or unrecognized
    pub frames_dropped: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub backend_url: String,
    pub probes: CoordinatorStats,
    pub channels: ChannelStats,
}

pub fn status_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = StatusResponse {
        uptime_secs: state.uptime().as_secs(),
        backend_url: state.args.backend_url.clone(),
        probes: state.coordinator.stats(),
        channels: ChannelStats {
            connected: state.channels.connection_count(),
            superseded: state.channels.replaced_count(),
            frames_handled: state.dispatcher.handled_count(),
            frames_dropped: state.dispatcher.dropped_count(),
        },
    };

    json_response(StatusCode::OK, &response)
}
