//! Tally Core - Records, Aggregates and Errors
//!
//! Pure data types and the aggregate calculator. No I/O lives here; every
//! other crate in the workspace depends on this one.

pub mod aggregate;
pub mod error;
pub mod record;

pub use aggregate::{compute, compute_at, round2, AggregateSnapshot};
pub use error::{CacheError, ConfigError, SourceError, WatchError};
pub use record::{Record, UNCATEGORIZED};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
