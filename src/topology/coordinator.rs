//! Probe coordinator: request coalescing over the status cache
//!
//! `request_check` answers from the cache at once and schedules at most one probe per
//! `(kind, target)`. The probe task owns its in-flight guard, so the marker is released when the
//! task ends however it ends, after the outcome has been written to the cache.

use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn, Instrument};

use super::cache::StatusCache;
use super::context::ProbeContext;
use super::in_flight::{InFlightGuard, InFlightSet};
use super::probe::{Directory, Prober};
use super::{Status, StatusRecord, TargetKind};
use crate::types::Result;
use crate::worker::{PoolMetrics, ProbePool};

/// Coordinator counters, exposed on `/status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStats {
    pub cached_connectors: usize,
    pub cached_resources: usize,
    pub in_flight: usize,
    pub oldest_in_flight_ms: Option<u64>,
    pub probes_scheduled: u64,
    pub checks_coalesced: u64,
    pub probes_rejected: u64,
    pub pool: PoolMetrics,
}

/// Everything a detached probe needs, handed over explicitly
struct ProbeTask {
    guard: InFlightGuard,
    cache: Arc<StatusCache>,
    directory: Arc<dyn Directory>,
    prober: Arc<dyn Prober>,
}

/// Coalesces reachability checks and owns the shared status state.
///
/// Constructed by whoever owns the topology session (the server's `AppState`). Dropping it
/// closes the probe pool.
pub struct ProbeCoordinator {
    cache: Arc<StatusCache>,
    in_flight: Arc<InFlightSet>,
    directory: Arc<dyn Directory>,
    prober: Arc<dyn Prober>,
    pool: ProbePool,
    scheduled: AtomicU64,
    coalesced: AtomicU64,
    rejected: AtomicU64,
}

impl ProbeCoordinator {
    pub fn new(directory: Arc<dyn Directory>, prober: Arc<dyn Prober>, pool: ProbePool) -> Self {
        Self {
            cache: Arc::new(StatusCache::new()),
            in_flight: Arc::new(InFlightSet::new()),
            directory,
            prober,
            pool,
            scheduled: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Return the cached status of `target` and make sure a probe is running for it.
    ///
    /// Never waits for the probe. While one is outstanding, further calls coalesce onto it and
    /// observe the pre-probe value.
    pub fn request_check(
        &self,
        kind: TargetKind,
        target: &str,
        ctx: &ProbeContext,
    ) -> StatusRecord {
        let domain = ctx.domain.as_str();
        let snapshot = self.cache.snapshot(domain, kind, target);

        let Some(guard) = self.in_flight.try_begin(domain, kind, target) else {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(domain = domain, kind = %kind, target = target, "Probe already running, coalesced");
            return snapshot;
        };

        let task = ProbeTask {
            guard,
            cache: Arc::clone(&self.cache),
            directory: Arc::clone(&self.directory),
            prober: Arc::clone(&self.prober),
        };
        let span = tracing::debug_span!(
            "probe",
            kind = %kind,
            target = target,
            domain = %ctx.domain,
        );

        match self.pool.submit(ctx.clone().scope(run_probe(task)).instrument(span)) {
            Ok(()) => {
                self.scheduled.fetch_add(1, Ordering::Relaxed);
                debug!(domain = domain, kind = %kind, target = target, "Probe scheduled");
            }
            Err(e) => {
                // The rejected job (and its guard) is already dropped
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(domain = domain, kind = %kind, target = target, "Probe not scheduled: {}", e);
            }
        }

        snapshot
    }

    /// True iff every key has at least one completed probe in `domain`, whatever its outcome
    pub fn batch_done<'a, I>(&self, domain: &str, kind: TargetKind, targets: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.cache.all_checked(domain, kind, targets)
    }

    /// Keys without a completed probe in `domain`
    pub fn pending<'a, I>(&self, domain: &str, kind: TargetKind, targets: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.cache.missing(domain, kind, targets)
    }

    /// Current status without scheduling anything; `Checking` when only a probe is known
    pub fn peek(&self, domain: &str, kind: TargetKind, target: &str) -> StatusRecord {
        match self.cache.get(domain, kind, target) {
            Some(record) => record,
            None if self.in_flight.contains(domain, kind, target) => {
                StatusRecord::new(target, Status::Checking)
            }
            None => StatusRecord::unknown(target),
        }
    }

    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            cached_connectors: self.cache.len(TargetKind::Connector),
            cached_resources: self.cache.len(TargetKind::Resource),
            in_flight: self.in_flight.len(),
            oldest_in_flight_ms: self.in_flight.oldest().map(|d| d.as_millis() as u64),
            probes_scheduled: self.scheduled.load(Ordering::Relaxed),
            checks_coalesced: self.coalesced.load(Ordering::Relaxed),
            probes_rejected: self.rejected.load(Ordering::Relaxed),
            pool: self.pool.metrics(),
        }
    }
}

/// Resolve then probe. Errors stay inside the task.
async fn probe_target(
    directory: &dyn Directory,
    prober: &dyn Prober,
    kind: TargetKind,
    target: &str,
) -> Result<bool> {
    let descriptor = directory.read(kind, target).await?;
    prober.check(&descriptor).await
}

async fn run_probe(task: ProbeTask) {
    let ProbeTask {
        guard,
        cache,
        directory,
        prober,
    } = task;
    let key = guard.key().clone();
    let (kind, target) = (key.kind, key.target.as_str());
    let started = Instant::now();

    let outcome = AssertUnwindSafe(probe_target(
        directory.as_ref(),
        prober.as_ref(),
        kind,
        target,
    ))
    .catch_unwind()
    .await;

    let status = match outcome {
        Ok(Ok(reachable)) => Status::from_probe(reachable),
        Ok(Err(e)) if e.is_probe_failure() => {
            warn!(kind = %kind, target = target, "Error checking connection: {}", e);
            Status::Failure
        }
        Ok(Err(e)) => {
            error!(kind = %kind, target = target, "Unexpected error checking connection: {}", e);
            Status::Failure
        }
        Err(_) => {
            error!(kind = %kind, target = target, "Connection check panicked");
            Status::Failure
        }
    };

    cache.record(&key, status);
    drop(guard);

    debug!(
        domain = %key.domain,
        kind = %kind,
        target = %target,
        status = ?status,
        duration_ms = started.elapsed().as_millis() as u64,
        "Probe finished"
    );
}
