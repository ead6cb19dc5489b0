//! Topology polling endpoints
//!
//! `GET /topology/batch?kind=resource&keys=ldap1,ldap2`:
//!
//! ```json
//! { "kind": "resource", "done": false, "total": 2, "pending": ["ldap2"] }
//! ```
//!
//! `GET /topology/status?kind=connector&key=csv` returns the status record without scheduling
//! a probe; a key with a probe running and no completed check reads as `CHECKING`.
//!
//! Both answer for the caller's tenant domain and, like the push channel, require a session.
//! The server resolves the caller before routing here.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::{bad_request_response, json_response, parse_query};
use crate::server::AppState;
use crate::topology::{ProbeContext, TargetKind};

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub kind: TargetKind,
    /// Every key has a completed check
    pub done: bool,
    pub total: usize,
    /// Keys still without a completed check
    pub pending: Vec<String>,
}

fn kind_param(params: &HashMap<String, String>) -> Result<TargetKind, String> {
    params
        .get("kind")
        .ok_or_else(|| "Missing query parameter: kind".to_string())?
        .parse::<TargetKind>()
        .map_err(|e| e.to_string())
}

pub fn handle_batch_query(
    state: Arc<AppState>,
    query: Option<&str>,
    ctx: &ProbeContext,
) -> Response<Full<Bytes>> {
    let params = parse_query(query);
    let kind = match kind_param(&params) {
        Ok(kind) => kind,
        Err(msg) => return bad_request_response(&msg),
    };

    let keys: Vec<&str> = params
        .get("keys")
        .map(|keys| keys.split(',').map(str::trim).filter(|k| !k.is_empty()).collect())
        .unwrap_or_default();

    let pending = state
        .coordinator
        .pending(&ctx.domain, kind, keys.iter().copied());
    let response = BatchResponse {
        kind,
        done: pending.is_empty(),
        total: keys.len(),
        pending,
    };

    json_response(StatusCode::OK, &response)
}

pub fn handle_status_query(
    state: Arc<AppState>,
    query: Option<&str>,
    ctx: &ProbeContext,
) -> Response<Full<Bytes>> {
    let params = parse_query(query);
    let kind = match kind_param(&params) {
        Ok(kind) => kind,
        Err(msg) => return bad_request_response(&msg),
    };
    let Some(key) = params.get("key").filter(|k| !k.is_empty()) else {
        return bad_request_response("Missing query parameter: key");
    };

    json_response(StatusCode::OK, &state.coordinator.peek(&ctx.domain, kind, key))
}
