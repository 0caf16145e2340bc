//! Cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    /// Reads served from a valid snapshot.
    pub hits: u64,
    /// Reads that needed a recompute.
    pub misses: u64,
    /// Source loads performed by the recompute path.
    pub recomputations: u64,
    /// Reads that joined an already running recompute.
    pub coalesced: u64,
    /// Failed recomputes.
    pub failures: u64,
    /// Reads answered with a stale snapshot after a failed recompute.
    pub stale_served: u64,
    /// Calls to `invalidate`, including debounced change signals.
    pub invalidations: u64,
    pub watch_available: bool,
    pub has_snapshot: bool,
    pub last_error: Option<String>,
}

impl CacheMetrics {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub recomputations: AtomicU64,
    pub coalesced: AtomicU64,
    pub failures: AtomicU64,
    pub stale_served: AtomicU64,
    pub invalidations: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
