//! HTTP route handlers

mod health;
mod status;
mod topology;

pub use health::{health_check, version_info, HealthResponse, VersionInfo};
pub use status::{status_check, StatusResponse};
pub use topology::{handle_batch_query, handle_status_query, BatchResponse};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;

/// Decode a query string into key/value pairs. Undecodable input yields an empty map.
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .and_then(|q| serde_urlencoded::from_str::<HashMap<String, String>>(q).ok())
        .unwrap_or_default()
}

/// JSON response with the usual headers
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Cache-Control", "no-store")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// Not found response
pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "error": "Not Found",
            "path": path,
            "hint": "Use WebSocket connection to /topology/ws"
        }),
    )
}

/// Bad request response
pub fn bad_request_response(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({
            "error": "Bad Request",
            "message": message
        }),
    )
}

/// Unauthorized response
pub fn unauthorized_response(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::UNAUTHORIZED,
        &serde_json::json!({ "error": message }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let params = parse_query(Some("kind=resource&keys=ldap1%2Cldap2"));
        assert_eq!(params.get("kind").map(String::as_str), Some("resource"));
        assert_eq!(params.get("keys").map(String::as_str), Some("ldap1,ldap2"));
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn test_error_responses() {
        assert_eq!(not_found_response("/nope").status(), StatusCode::NOT_FOUND);
        assert_eq!(bad_request_response("bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            unauthorized_response("Session required").status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
