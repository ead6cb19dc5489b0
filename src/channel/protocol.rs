//! Push channel wire protocol
//!
//! JSON text frames. Inbound:
//!
//! ```json
//! { "kind": "CHECK_CONNECTOR" | "CHECK_RESOURCE" | "ADD_ENDPOINT",
//!   "target": "<key>", "source": "<key>", "scope": "<string>" }
//! ```
//!
//! Outbound, for checks:
//!
//! ```json
//! { "status": "UNKNOWN" | "REACHABLE" | "UNREACHABLE" | "FAILURE", "target": "<key>" }
//! ```
//!
//! and for `ADD_ENDPOINT`, a client-side draw instruction:
//!
//! ```json
//! { "command": "addEndpoint", "source": "<key>", "target": "<key>", "scope": "<string>" }
//! ```

use serde::{Deserialize, Serialize};

use crate::topology::{StatusRecord, TargetKind};
use crate::types::{Result, TopologyError};

/// Inbound message kind. Anything unrecognized lands on `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    CheckConnector,
    CheckResource,
    AddEndpoint,
    #[serde(other)]
    Unknown,
}

/// Raw inbound frame, before field validation
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub kind: MessageKind,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Validated inbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Check {
        kind: TargetKind,
        target: String,
    },
    AddEndpoint {
        source: String,
        target: String,
        scope: String,
    },
}

impl Command {
    /// Parse and validate one text frame
    pub fn parse(raw: &str) -> Result<Self> {
        let frame: InboundFrame = serde_json::from_str(raw)?;
        Command::try_from(frame)
    }
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TopologyError::Protocol(format!("Missing required field: {field}")))
}

impl TryFrom<InboundFrame> for Command {
    type Error = TopologyError;

    fn try_from(frame: InboundFrame) -> Result<Self> {
        match frame.kind {
            MessageKind::CheckConnector => Ok(Command::Check {
                kind: TargetKind::Connector,
                target: required("target", frame.target)?,
            }),
            MessageKind::CheckResource => Ok(Command::Check {
                kind: TargetKind::Resource,
                target: required("target", frame.target)?,
            }),
            MessageKind::AddEndpoint => Ok(Command::AddEndpoint {
                source: required("source", frame.source)?,
                target: required("target", frame.target)?,
                scope: required("scope", frame.scope)?,
            }),
            MessageKind::Unknown => Err(TopologyError::Protocol("Unrecognized message kind".into())),
        }
    }
}

/// Client-side draw instruction, passed through untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawInstruction {
    pub command: &'static str,
    pub source: String,
    pub target: String,
    pub scope: String,
}

impl DrawInstruction {
    pub fn add_endpoint(source: String, target: String, scope: String) -> Self {
        Self {
            command: "addEndpoint",
            source,
            target,
            scope,
        }
    }
}

/// Message written to the push channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Status(StatusRecord),
    Draw(DrawInstruction),
}

impl OutboundFrame {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Status;

    #[test]
    fn test_parse_check_resource() {
        let cmd = Command::parse(r#"{"kind":"CHECK_RESOURCE","target":"ldap1"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Check {
                kind: TargetKind::Resource,
                target: "ldap1".into()
            }
        );
    }

    #[test]
    fn test_parse_add_endpoint() {
        let cmd = Command::parse(
            r#"{"kind":"ADD_ENDPOINT","source":"csv","target":"ldap1","scope":"CONNECTOR"}"#,
        )
        .unwrap();
        assert!(matches!(cmd, Command::AddEndpoint { ref scope, .. } if scope == "CONNECTOR"));
    }

    #[test]
    fn test_unknown_kind_is_protocol_error() {
        let err = Command::parse(r#"{"kind":"DELETE_EVERYTHING","target":"ldap1"}"#).unwrap_err();
        assert!(matches!(err, TopologyError::Protocol(_)));
    }

    #[test]
    fn test_malformed_frames() {
        for raw in [
            "not json",
            r#"{"target":"ldap1"}"#,
            r#"{"kind":"CHECK_CONNECTOR"}"#,
            r#"{"kind":"CHECK_CONNECTOR","target":""}"#,
            r#"{"kind":"ADD_ENDPOINT","target":"ldap1"}"#,
            r#"{"kind":42}"#,
        ] {
            assert!(
                matches!(Command::parse(raw), Err(TopologyError::Protocol(_))),
                "expected protocol error for {raw}"
            );
        }
    }

    #[test]
    fn test_outbound_serialization() {
        let status = OutboundFrame::Status(StatusRecord::new("ldap1", Status::Unknown));
        assert_eq!(
            status.to_json().unwrap(),
            r#"{"status":"UNKNOWN","target":"ldap1"}"#
        );

        let draw = OutboundFrame::Draw(DrawInstruction::add_endpoint(
            "csv".into(),
            "ldap1".into(),
            "CONNECTOR".into(),
        ));
        assert_eq!(
            draw.to_json().unwrap(),
            r#"{"command":"addEndpoint","source":"csv","target":"ldap1","scope":"CONNECTOR"}"#
        );
    }
}
