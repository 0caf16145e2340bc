//! Tally Storage - Record Sources and the Aggregate Cache
//!
//! Defines the record source abstraction, two implementations (a JSON file
//! and an in-memory store), and the cache that keeps aggregate statistics
//! over a source fresh.

pub mod cache;
pub mod json_file;
pub mod memory;
pub mod source;

pub use cache::{
    AggregateCache, CacheConfig, CacheMetrics, ChangeNotifier, DebounceState, Debouncer,
    NotifierStatus, ReadOrigin, StatsRead,
};
pub use json_file::{JsonFileRecordSource, DEFAULT_POLL_INTERVAL};
pub use memory::InMemoryRecordSource;
pub use source::{
    ChangeEvent, ChangeOrigin, ChangeStream, RecordSource, RecordStore, CHANGE_CHANNEL_CAPACITY,
};
