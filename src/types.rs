//! Shared error type for the topology status service

use thiserror::Error;

/// Errors raised across the service.
///
/// `Lookup` and `Probe` never cross a probe task boundary: the coordinator folds them into a
/// `Failure` status. `Protocol` never closes a channel: the dispatcher logs and drops the frame.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Target descriptor could not be resolved
    #[error("Lookup failed for {target}: {reason}")]
    Lookup { target: String, reason: String },

    /// The target is unknown to the backing directory
    #[error("Target not found: {0}")]
    NotFound(String),

    /// Reachability probe itself errored
    #[error("Probe failed for {target}: {reason}")]
    Probe { target: String, reason: String },

    /// Malformed inbound frame or unrecognized kind
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TopologyError {
    /// Expected outcomes of probing a bad target, as opposed to a fault in the service itself.
    /// Both end as `Failure`; only the log level differs.
    pub fn is_probe_failure(&self) -> bool {
        matches!(
            self,
            TopologyError::Lookup { .. }
                | TopologyError::NotFound(_)
                | TopologyError::Probe { .. }
        )
    }
}

impl From<serde_json::Error> for TopologyError {
    fn from(e: serde_json::Error) -> Self {
        TopologyError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TopologyError>;
