//! Shared application state for Axum routers.

use std::sync::Arc;

use tally_storage::{AggregateCache, CacheConfig, RecordSource, RecordStore};
use tokio::sync::Mutex;

/// Record store behind the CRUD routes.
pub type SharedStore = Arc<dyn RecordStore>;

/// Serializes read-modify-write cycles on the store.
pub type WriteLock = Arc<Mutex<()>>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Aggregate cache over the same store the CRUD routes write to.
    pub cache: AggregateCache,
    pub store: SharedStore,
    pub write_lock: WriteLock,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build the cache over `store` and wrap both.
    ///
    /// Must be called inside a Tokio runtime for change watching to start.
    pub fn new<S>(store: Arc<S>, cache_config: CacheConfig) -> Self
    where
        S: RecordStore + 'static,
    {
        let source: Arc<dyn RecordSource> = store.clone();
        let cache = AggregateCache::new(source, cache_config);
        Self::with_cache(store, cache)
    }

    /// Wrap an existing cache. `cache` must read from `store`.
    pub fn with_cache(store: SharedStore, cache: AggregateCache) -> Self {
        Self {
            cache,
            store,
            write_lock: Arc::new(Mutex::new(())),
            start_time: std::time::Instant::now(),
        }
    }
}

crate::impl_from_ref!(AggregateCache, cache);
crate::impl_from_ref!(SharedStore, store);
crate::impl_from_ref!(WriteLock, write_lock);
crate::impl_from_ref!(std::time::Instant, start_time);
