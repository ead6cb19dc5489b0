//! Live topology status
//!
//! Answers "is this connector/resource reachable?" without ever blocking the asker.
//!
//! ```text
//!  request_check(kind, key)
//!        │
//!        ├── StatusCache ──────────► cached record (or UNKNOWN), returned immediately
//!        │
//!        └── InFlightSet::try_begin
//!                 │ first asker only
//!                 ▼
//!            ProbePool ──► Directory.read ──► Prober.check ──► StatusCache.record
//!                                                          └──► in-flight marker released
//! ```
//!
//! Completion is never pushed back to the asker; a later check or batch poll observes it.
//! Cache entries and in-flight markers are kept per tenant domain.

pub mod cache;
pub mod context;
pub mod coordinator;
pub mod in_flight;
pub mod probe;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::TopologyError;

pub use cache::StatusCache;
pub use context::ProbeContext;
pub use coordinator::{CoordinatorStats, ProbeCoordinator};
pub use in_flight::{InFlightGuard, InFlightSet};
pub use probe::{Directory, Prober, RestDirectory, RestProber, TargetDescriptor};

/// Kind of target whose reachability is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Connector,
    Resource,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Connector => "connector",
            TargetKind::Resource => "resource",
        }
    }

    /// Backend collection path segment for this kind
    pub fn collection(&self) -> &'static str {
        match self {
            TargetKind::Connector => "connectors",
            TargetKind::Resource => "resources",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "connector" | "connectors" => Ok(TargetKind::Connector),
            "resource" | "resources" => Ok(TargetKind::Resource),
            other => Err(TopologyError::Protocol(format!("Unknown target kind: {other}"))),
        }
    }
}

/// Identity of a tracked target. Tenants never share a status or a probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub domain: String,
    pub kind: TargetKind,
    pub target: String,
}

impl TargetKey {
    pub fn new(domain: &str, kind: TargetKind, target: &str) -> Self {
        Self {
            domain: domain.to_string(),
            kind,
            target: target.to_string(),
        }
    }
}

/// Observable reachability status of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Never checked (no cache entry)
    Unknown,
    /// No completed check yet, probe running
    Checking,
    Reachable,
    Unreachable,
    /// Lookup or probe errored
    Failure,
}

impl Status {
    /// Map a probe outcome to the status stored in the cache
    pub fn from_probe(reachable: bool) -> Self {
        if reachable {
            Status::Reachable
        } else {
            Status::Unreachable
        }
    }

    /// Whether this status is the outcome of a completed probe
    pub fn is_completed(&self) -> bool {
        matches!(self, Status::Reachable | Status::Unreachable | Status::Failure)
    }
}

/// Last known status of one target, also the outbound status frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: Status,
    pub target: String,
}

impl StatusRecord {
    pub fn new(target: impl Into<String>, status: Status) -> Self {
        Self {
            status,
            target: target.into(),
        }
    }

    /// Synthetic record for a key with no completed check
    pub fn unknown(target: impl Into<String>) -> Self {
        Self::new(target, Status::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_record_wire_format() {
        let record = StatusRecord::new("ldap1", Status::Reachable);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"status":"REACHABLE","target":"ldap1"}"#);

        let unknown = serde_json::to_string(&StatusRecord::unknown("ldap2")).unwrap();
        assert_eq!(unknown, r#"{"status":"UNKNOWN","target":"ldap2"}"#);
    }

    #[test]
    fn test_target_kind_parse() {
        assert_eq!("connector".parse::<TargetKind>().unwrap(), TargetKind::Connector);
        assert_eq!("Resources".parse::<TargetKind>().unwrap(), TargetKind::Resource);
        assert!("realm".parse::<TargetKind>().is_err());
    }

    #[test]
    fn test_completed_statuses() {
        assert!(!Status::Unknown.is_completed());
        assert!(!Status::Checking.is_completed());
        assert!(Status::from_probe(true).is_completed());
        assert_eq!(Status::from_probe(false), Status::Unreachable);
        assert!(Status::Failure.is_completed());
    }
}
