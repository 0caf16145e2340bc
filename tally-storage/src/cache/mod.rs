//! Aggregate cache with TTL expiry and debounced change invalidation.
//!
//! [`AggregateCache`] serves the most recent [`AggregateSnapshot`] while it
//! is valid and recomputes it from the record source otherwise. Validity
//! ends when the TTL passes or when the source reports a change; change
//! bursts are collapsed by [`ChangeNotifier`] before they reach the cache.
//!
//! # Example
//!
//! ```ignore
//! let cache = AggregateCache::new(source, CacheConfig::from_env()?);
//! cache.warm().await?;
//!
//! let read = cache.get(false).await?;
//! if read.is_stale_fallback() {
//!     tracing::warn!(age_ms = read.cache_age().as_millis() as u64, "Serving stale stats");
//! }
//! ```
//!
//! [`AggregateSnapshot`]: tally_core::AggregateSnapshot

pub mod config;
pub mod debounce;
pub mod manager;
pub mod metrics;
pub mod read;

pub use config::CacheConfig;
pub use debounce::{ChangeNotifier, DebounceState, Debouncer, NotifierStatus};
pub use manager::AggregateCache;
pub use metrics::CacheMetrics;
pub use read::{ReadOrigin, StatsRead};
