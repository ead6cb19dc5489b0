//! Last-known status per target
//!
//! One map keyed by `(domain, kind, target)` serves both connectors and resources of every
//! tenant. Entries appear on the first completed probe and live as long as the cache; there is
//! no eviction.

use dashmap::DashMap;

use super::{Status, StatusRecord, TargetKey, TargetKind};

/// Thread-safe status cache, O(1) reads and writes.
#[derive(Debug, Default)]
pub struct StatusCache {
    entries: DashMap<TargetKey, StatusRecord>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached record for a target, if a probe ever completed for it
    pub fn get(&self, domain: &str, kind: TargetKind, target: &str) -> Option<StatusRecord> {
        self.entries
            .get(&TargetKey::new(domain, kind, target))
            .map(|entry| entry.value().clone())
    }

    /// Cached record, or a synthetic `Unknown` one
    pub fn snapshot(&self, domain: &str, kind: TargetKind, target: &str) -> StatusRecord {
        self.get(domain, kind, target)
            .unwrap_or_else(|| StatusRecord::unknown(target))
    }

    /// Store a probe outcome. Last write wins.
    pub fn record(&self, key: &TargetKey, status: Status) {
        self.entries
            .insert(key.clone(), StatusRecord::new(key.target.as_str(), status));
    }

    pub fn contains(&self, domain: &str, kind: TargetKind, target: &str) -> bool {
        self.entries
            .contains_key(&TargetKey::new(domain, kind, target))
    }

    /// True iff every key has a completed check. Empty input is trivially done.
    pub fn all_checked<'a, I>(&self, domain: &str, kind: TargetKind, targets: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        targets
            .into_iter()
            .all(|target| self.contains(domain, kind, target))
    }

    /// Keys among `targets` without a completed check, in input order
    pub fn missing<'a, I>(&self, domain: &str, kind: TargetKind, targets: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        targets
            .into_iter()
            .filter(|target| !self.contains(domain, kind, target))
            .map(str::to_string)
            .collect()
    }

    /// Number of cached records of one kind, across domains
    pub fn len(&self, kind: TargetKind) -> usize {
        self.entries.iter().filter(|entry| entry.key().kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "Master";

    fn key(kind: TargetKind, target: &str) -> TargetKey {
        TargetKey::new(MASTER, kind, target)
    }

    #[test]
    fn test_absent_is_unknown() {
        let cache = StatusCache::new();
        assert!(cache.get(MASTER, TargetKind::Resource, "ldap1").is_none());
        assert_eq!(
            cache.snapshot(MASTER, TargetKind::Resource, "ldap1"),
            StatusRecord::unknown("ldap1")
        );
    }

    #[test]
    fn test_kinds_are_separate() {
        let cache = StatusCache::new();
        cache.record(&key(TargetKind::Connector, "ldap1"), Status::Reachable);

        assert!(cache.contains(MASTER, TargetKind::Connector, "ldap1"));
        assert!(!cache.contains(MASTER, TargetKind::Resource, "ldap1"));
        assert_eq!(cache.len(TargetKind::Connector), 1);
        assert_eq!(cache.len(TargetKind::Resource), 0);
    }

    #[test]
    fn test_domains_are_separate() {
        let cache = StatusCache::new();
        cache.record(
            &TargetKey::new("Two", TargetKind::Resource, "ldap1"),
            Status::Unreachable,
        );

        assert!(cache.contains("Two", TargetKind::Resource, "ldap1"));
        assert!(!cache.contains(MASTER, TargetKind::Resource, "ldap1"));
        assert!(!cache.all_checked(MASTER, TargetKind::Resource, ["ldap1"]));
        assert_eq!(
            cache.snapshot(MASTER, TargetKind::Resource, "ldap1").status,
            Status::Unknown
        );
    }

    #[test]
    fn test_last_write_wins() {
        let cache = StatusCache::new();
        cache.record(&key(TargetKind::Resource, "db"), Status::Reachable);
        cache.record(&key(TargetKind::Resource, "db"), Status::Failure);

        assert_eq!(
            cache.snapshot(MASTER, TargetKind::Resource, "db").status,
            Status::Failure
        );
        assert_eq!(cache.len(TargetKind::Resource), 1);
    }

    #[test]
    fn test_all_checked_and_missing() {
        let cache = StatusCache::new();
        cache.record(&key(TargetKind::Resource, "ldap1"), Status::Unreachable);

        assert!(cache.all_checked(MASTER, TargetKind::Resource, ["ldap1"]));
        assert!(!cache.all_checked(MASTER, TargetKind::Resource, ["ldap1", "ldap2"]));
        assert!(cache.all_checked(MASTER, TargetKind::Resource, std::iter::empty()));
        assert_eq!(
            cache.missing(MASTER, TargetKind::Resource, ["ldap1", "ldap2"]),
            vec!["ldap2".to_string()]
        );
    }
}
