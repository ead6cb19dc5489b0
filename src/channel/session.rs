//! Binding push connections to their owning session
//!
//! The correlation key is decided once, when the channel attaches, so that pushes land on the
//! right client across reconnects whatever the deployment's session tracking looks like.

use std::fmt;
use std::str::FromStr;

use crate::types::TopologyError;

/// How the deployment tracks sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTracking {
    pub url: bool,
    pub cookie: bool,
}

impl SessionTracking {
    /// Session ids travel only inside URLs
    pub fn url_only(&self) -> bool {
        self.url && !self.cookie
    }
}

impl Default for SessionTracking {
    fn default() -> Self {
        Self {
            url: false,
            cookie: true,
        }
    }
}

impl FromStr for SessionTracking {
    type Err = TopologyError;

    /// Comma-separated list of `url` and `cookie`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tracking = SessionTracking {
            url: false,
            cookie: false,
        };
        for mode in s.split(',').map(str::trim).filter(|m| !m.is_empty()) {
            match mode.to_ascii_lowercase().as_str() {
                "url" => tracking.url = true,
                "cookie" => tracking.cookie = true,
                other => {
                    return Err(TopologyError::Config(format!(
                        "Unknown session tracking mode: {other}"
                    )))
                }
            }
        }
        if !tracking.url && !tracking.cookie {
            return Err(TopologyError::Config("No session tracking mode given".into()));
        }
        Ok(tracking)
    }
}

impl fmt::Display for SessionTracking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.url, self.cookie) {
            (true, true) => f.write_str("url,cookie"),
            (true, false) => f.write_str("url"),
            _ => f.write_str("cookie"),
        }
    }
}

/// What the transport knows about the attaching connection
#[derive(Debug, Clone, Copy)]
pub struct AttachRequest<'a> {
    /// Session the channel attaches to
    pub session_id: &'a str,
    /// Session cookie value, when the client sent one
    pub cookie: Option<&'a str>,
    /// Whether the session id the client requested is currently valid
    pub requested_session_valid: bool,
}

/// Decide the correlation key for a push connection.
///
/// `Some(id)` binds the channel to the session id. `None` defers to cookie-based correlation.
pub fn session_correlation_id(tracking: &SessionTracking, request: &AttachRequest<'_>) -> Option<String> {
    if tracking.url_only() {
        return Some(request.session_id.to_string());
    }

    match request.cookie {
        Some(_) if request.requested_session_valid => None,
        _ => Some(request.session_id.to_string()),
    }
}

/// Extract one cookie value from a `Cookie` header
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}
