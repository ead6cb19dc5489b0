//! Routes inbound frames to the coordinator
//!
//! Dispatch is synchronous and never performs I/O: a check reads the cache, maybe schedules a
//! probe, and the reply goes straight back. Frames that fail to parse or carry an unrecognized
//! kind are logged and dropped; they never fault the channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::protocol::{Command, DrawInstruction, OutboundFrame};
use crate::topology::{ProbeContext, ProbeCoordinator};

pub struct Dispatcher {
    coordinator: Arc<ProbeCoordinator>,
    handled: AtomicU64,
    dropped: AtomicU64,
}

impl Dispatcher {
    pub fn new(coordinator: Arc<ProbeCoordinator>) -> Self {
        Self {
            coordinator,
            handled: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Handle one inbound text frame. Returns the frame to write back, if any.
    pub fn on_message(&self, raw: &str, ctx: &ProbeContext) -> Option<OutboundFrame> {
        match Command::parse(raw) {
            Ok(command) => {
                self.handled.fetch_add(1, Ordering::Relaxed);
                Some(self.dispatch(command, ctx))
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Error managing push channel message, dropped: {} ({})", e, raw);
                None
            }
        }
    }

    fn dispatch(&self, command: Command, ctx: &ProbeContext) -> OutboundFrame {
        match command {
            Command::Check { kind, target } => {
                let record = self.coordinator.request_check(kind, &target, ctx);
                debug!(kind = %kind, target = %target, status = ?record.status, "Check answered");
                OutboundFrame::Status(record)
            }
            Command::AddEndpoint {
                source,
                target,
                scope,
            } => OutboundFrame::Draw(DrawInstruction::add_endpoint(source, target, scope)),
        }
    }

    pub fn coordinator(&self) -> &Arc<ProbeCoordinator> {
        &self.coordinator
    }

    /// Frames dispatched so far
    pub fn handled_count(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    /// Frames dropped as malformed or unrecognized
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
