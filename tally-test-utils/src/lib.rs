//! Tally Test Utilities
//!
//! Shared test infrastructure for the Tally workspace:
//! - A gated record source for driving concurrent recomputes
//! - Proptest generators for records
//! - Fixtures for common record collections
//! - Assertions over snapshots and reads

// Re-export core types for convenience
pub use tally_core::{
    compute, compute_at, round2, AggregateSnapshot, CacheError, Record, SourceError, Timestamp,
    WatchError, UNCATEGORIZED,
};
pub use tally_storage::{
    AggregateCache, CacheConfig, ChangeOrigin, InMemoryRecordSource, ReadOrigin, RecordSource,
    StatsRead,
};

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tally_storage::ChangeStream;
use tokio::sync::watch;

// ============================================================================
// MOCK SOURCES
// ============================================================================

/// Record source whose loads block until the gate is opened.
///
/// Wraps an [`InMemoryRecordSource`] for records, failure injection and
/// change events. Records are read after the gate opens, so changes made
/// while a load is parked are visible to it.
#[derive(Debug)]
pub struct GatedRecordSource {
    inner: InMemoryRecordSource,
    gate: watch::Sender<bool>,
    loads: AtomicU64,
    parked: AtomicU64,
}

impl GatedRecordSource {
    /// A source with the gate closed.
    pub fn new(records: Vec<Record>) -> Self {
        let (gate, _rx) = watch::channel(false);
        Self {
            inner: InMemoryRecordSource::new(records),
            gate,
            loads: AtomicU64::new(0),
            parked: AtomicU64::new(0),
        }
    }

    /// Let every parked and future load through.
    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Park future loads again.
    pub fn close(&self) {
        self.gate.send_replace(false);
    }

    /// Number of `load_all` calls started so far.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Loads currently waiting on the gate.
    pub fn parked(&self) -> u64 {
        self.parked.load(Ordering::SeqCst)
    }

    /// The wrapped source, for record updates and failure injection.
    pub fn records(&self) -> &InMemoryRecordSource {
        &self.inner
    }
}

#[async_trait]
impl RecordSource for GatedRecordSource {
    async fn load_all(&self) -> Result<Vec<Record>, SourceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.parked.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        let opened = gate.wait_for(|open| *open).await.is_ok();
        self.parked.fetch_sub(1, Ordering::SeqCst);
        if !opened {
            return Err(SourceError::unavailable("gate dropped"));
        }
        self.inner.load_all().await
    }

    fn watch_supported(&self) -> bool {
        self.inner.watch_supported()
    }

    fn subscribe_to_changes(&self) -> Result<ChangeStream, WatchError> {
        self.inner.subscribe_to_changes()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for records.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map, Value};

    /// Prices as they appear in the wild: integers, decimals, numeric
    /// strings, nulls and absent.
    pub fn arb_price() -> impl Strategy<Value = Option<Value>> {
        prop_oneof![
            4 => (0i64..100_000).prop_map(|p| Some(json!(p))),
            4 => (0.0f64..10_000.0).prop_map(|p| Some(json!(p))),
            1 => (0i64..1000).prop_map(|p| Some(Value::String(p.to_string()))),
            1 => Just(Some(Value::Null)),
            1 => Just(None),
        ]
    }

    /// A usable category label.
    pub fn arb_category_label() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{0,8}"
    }

    /// Categories including every shape that falls back to Uncategorized.
    pub fn arb_category() -> impl Strategy<Value = Option<Value>> {
        prop_oneof![
            6 => arb_category_label().prop_map(|c| Some(Value::String(c))),
            1 => Just(Some(Value::String(String::new()))),
            1 => Just(Some(Value::Null)),
            1 => Just(Some(Value::Bool(false))),
            1 => Just(None),
        ]
    }

    pub fn arb_record() -> impl Strategy<Value = Record> {
        (
            proptest::option::of(1i64..1_000_000),
            proptest::option::of("[a-z ]{1,16}"),
            arb_category(),
            arb_price(),
        )
            .prop_map(|(id, name, category, price)| Record {
                id,
                name,
                category,
                price,
                extra: Map::new(),
            })
    }

    pub fn arb_records(max: usize) -> impl Strategy<Value = Vec<Record>> {
        proptest::collection::vec(arb_record(), 0..=max)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built record collections.

    use super::*;
    use serde_json::json;

    /// Three records: two in "A" priced 100 and 200, one uncategorized
    /// priced 50. Aggregates to total 3, value 350, average 116.67.
    pub fn reference_records() -> Vec<Record> {
        vec![
            record_from(json!({"id": 1, "name": "Alpha", "category": "A", "price": 100})),
            record_from(json!({"id": 2, "name": "Beta", "category": "A", "price": 200})),
            record_from(json!({"id": 3, "name": "Gamma", "price": 50})),
        ]
    }

    /// A small mixed catalog for CRUD tests.
    pub fn sample_catalog() -> Vec<Record> {
        vec![
            Record::new(1, "Laptop Pro", "Electronics", 2499.0),
            Record::new(2, "Noise Cancelling Headphones", "Electronics", 399.0),
            Record::new(3, "Ergonomic Chair", "Furniture", 799.0),
            Record::new(4, "Standing Desk", "Furniture", 1199.0),
            Record::new(5, "Coffee Mug", "Kitchen", 12.5),
        ]
    }

    /// `count` records in one category, priced 1..=count.
    pub fn numbered_records(count: i64, category: &str) -> Vec<Record> {
        (1..=count)
            .map(|i| Record::new(i, format!("Item {}", i), category, i as f64))
            .collect()
    }

    /// Deserialize a record from a JSON literal.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not a JSON object.
    pub fn record_from(value: serde_json::Value) -> Record {
        serde_json::from_value(value).expect("fixture record must be an object")
    }

    /// Cache config with short windows suited to paused-clock tests.
    pub fn fast_cache_config() -> CacheConfig {
        CacheConfig::new()
            .with_ttl(std::time::Duration::from_secs(5))
            .with_debounce_window(std::time::Duration::from_millis(100))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over aggregate snapshots and cache reads.

    use super::*;

    /// Assert the internal consistency every snapshot must have.
    #[track_caller]
    pub fn assert_snapshot_consistent(snapshot: &AggregateSnapshot) {
        assert_eq!(
            snapshot.categorized(),
            snapshot.total,
            "category counts must sum to total: {:?}",
            snapshot
        );
        if snapshot.total == 0 {
            assert_eq!(snapshot.total_value, 0.0);
            assert_eq!(snapshot.average_price, 0.0);
            assert!(snapshot.categories.is_empty());
        }
        assert_eq!(round2(snapshot.total_value), snapshot.total_value);
        assert_eq!(round2(snapshot.average_price), snapshot.average_price);
    }

    /// Assert a read came from the given path.
    #[track_caller]
    pub fn assert_origin(read: &StatsRead, origin: ReadOrigin) {
        assert_eq!(
            read.origin(),
            origin,
            "unexpected read origin (age {:?})",
            read.cache_age()
        );
    }

    /// Assert a cache result failed because of the source.
    #[track_caller]
    pub fn assert_source_failure<T: std::fmt::Debug>(result: &Result<T, CacheError>) {
        match result {
            Err(CacheError::Source(_)) => {}
            other => panic!("Expected source failure, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
