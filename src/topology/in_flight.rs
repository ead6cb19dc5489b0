//! Targets with an outstanding probe
//!
//! Membership is taken with an atomic insert-if-absent and released by dropping the returned
//! [`InFlightGuard`]. The guard travels with the probe task, so the marker is released on every
//! exit path: normal completion, error, panic, or the task being dropped before it ran.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{TargetKey, TargetKind};

/// Concurrent set of targets currently being probed, per tenant domain
#[derive(Debug, Default)]
pub struct InFlightSet {
    /// key -> when the probe was scheduled
    entries: DashMap<TargetKey, Instant>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a target as in flight.
    ///
    /// Returns `None` when a probe is already outstanding for it in the same domain (the caller
    /// coalesces onto that probe). Otherwise returns the guard that owns the marker.
    pub fn try_begin(
        self: &Arc<Self>,
        domain: &str,
        kind: TargetKind,
        target: &str,
    ) -> Option<InFlightGuard> {
        let key = TargetKey::new(domain, kind, target);
        match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(InFlightGuard {
                    set: Arc::clone(self),
                    key,
                })
            }
        }
    }

    pub fn contains(&self, domain: &str, kind: TargetKind, target: &str) -> bool {
        self.entries
            .contains_key(&TargetKey::new(domain, kind, target))
    }

    /// Number of outstanding probes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Age of the oldest outstanding probe
    pub fn oldest(&self) -> Option<Duration> {
        self.entries.iter().map(|entry| entry.value().elapsed()).max()
    }

    fn release(&self, key: &TargetKey) {
        if let Some((_, started_at)) = self.entries.remove(key) {
            debug!(
                domain = %key.domain,
                kind = %key.kind,
                target = %key.target,
                held_ms = started_at.elapsed().as_millis() as u64,
                "In-flight marker released"
            );
        }
    }
}

/// Ownership of one in-flight marker. Dropping it releases the marker.
#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<InFlightSet>,
    key: TargetKey,
}

impl InFlightGuard {
    pub fn key(&self) -> &TargetKey {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "Master";

    #[test]
    fn test_second_begin_coalesces() {
        let set = Arc::new(InFlightSet::new());

        let guard = set.try_begin(MASTER, TargetKind::Resource, "ldap1");
        assert!(guard.is_some());
        assert!(set.try_begin(MASTER, TargetKind::Resource, "ldap1").is_none());
        assert!(set.contains(MASTER, TargetKind::Resource, "ldap1"));

        // Same key under another kind or another domain is independent
        assert!(set.try_begin(MASTER, TargetKind::Connector, "ldap1").is_some());
        let other_tenant = set.try_begin("Two", TargetKind::Resource, "ldap1");
        assert_eq!(
            other_tenant.map(|g| g.key().clone()),
            Some(TargetKey::new("Two", TargetKind::Resource, "ldap1"))
        );
    }

    #[test]
    fn test_drop_releases() {
        let set = Arc::new(InFlightSet::new());

        let guard = set.try_begin(MASTER, TargetKind::Connector, "csv").unwrap();
        assert_eq!(set.len(), 1);
        drop(guard);

        assert!(set.is_empty());
        assert!(set.try_begin(MASTER, TargetKind::Connector, "csv").is_some());
    }

    #[test]
    fn test_release_on_panic() {
        let set = Arc::new(InFlightSet::new());
        let guard = set.try_begin(MASTER, TargetKind::Resource, "db").unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _held = guard;
            panic!("probe blew up");
        }));

        assert!(result.is_err());
        assert!(!set.contains(MASTER, TargetKind::Resource, "db"));
    }

    #[test]
    fn test_concurrent_begin_single_winner() {
        let set = Arc::new(InFlightSet::new());
        let barrier = Arc::new(std::sync::Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let set = Arc::clone(&set);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    set.try_begin(MASTER, TargetKind::Resource, "ldap1")
                })
            })
            .collect();

        let guards: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(guards.len(), 1);
        assert!(set.oldest().is_some());
    }
}
