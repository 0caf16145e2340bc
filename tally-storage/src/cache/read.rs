//! Read results carrying freshness metadata.

use std::sync::Arc;
use std::time::Duration;

use tally_core::AggregateSnapshot;

/// How a read was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOrigin {
    /// Valid cached snapshot, no recompute.
    Cache,
    /// Recomputed for this read (or joined an in-flight recompute).
    Recomputed,
    /// Recompute failed; an older snapshot was served instead.
    StaleFallback,
    /// Cold start: recompute failed and a one-off load succeeded. The
    /// result was not stored.
    OnDemand,
}

/// Result of [`AggregateCache::get`](super::AggregateCache::get).
#[derive(Debug, Clone)]
pub struct StatsRead {
    snapshot: Arc<AggregateSnapshot>,
    cache_age: Duration,
    origin: ReadOrigin,
}

impl StatsRead {
    pub fn new(snapshot: Arc<AggregateSnapshot>, cache_age: Duration, origin: ReadOrigin) -> Self {
        Self {
            snapshot,
            cache_age,
            origin,
        }
    }

    /// Snapshot computed for this read; its age is zero.
    pub fn fresh(snapshot: Arc<AggregateSnapshot>, origin: ReadOrigin) -> Self {
        Self::new(snapshot, Duration::ZERO, origin)
    }

    pub fn snapshot(&self) -> &AggregateSnapshot {
        &self.snapshot
    }

    pub fn shared_snapshot(&self) -> Arc<AggregateSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Time since the served snapshot was computed.
    pub fn cache_age(&self) -> Duration {
        self.cache_age
    }

    pub fn origin(&self) -> ReadOrigin {
        self.origin
    }

    /// True when no recompute happened on behalf of this read.
    pub fn served_from_cache(&self) -> bool {
        matches!(self.origin, ReadOrigin::Cache | ReadOrigin::StaleFallback)
    }

    pub fn is_stale_fallback(&self) -> bool {
        self.origin == ReadOrigin::StaleFallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot() -> Arc<AggregateSnapshot> {
        Arc::new(AggregateSnapshot::empty(Utc::now()))
    }

    #[test]
    fn test_fresh_read_has_zero_age() {
        let read = StatsRead::fresh(snapshot(), ReadOrigin::Recomputed);
        assert_eq!(read.cache_age(), Duration::ZERO);
        assert!(!read.served_from_cache());
    }

    #[test]
    fn test_served_from_cache_by_origin() {
        let age = Duration::from_secs(4);
        assert!(StatsRead::new(snapshot(), age, ReadOrigin::Cache).served_from_cache());
        assert!(StatsRead::new(snapshot(), age, ReadOrigin::StaleFallback).served_from_cache());
        assert!(!StatsRead::new(snapshot(), age, ReadOrigin::OnDemand).served_from_cache());
        assert!(StatsRead::new(snapshot(), age, ReadOrigin::StaleFallback).is_stale_fallback());
    }
}
