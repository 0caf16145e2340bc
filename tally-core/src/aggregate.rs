//! Aggregate calculator.
//!
//! A pure function from a record collection to an [`AggregateSnapshot`].
//! Sums are accumulated unrounded and rounded once at the end.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Summary statistics over one record collection.
///
/// Every field is derived from the same input slice, so a snapshot is never
/// a mix of two collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
    /// Number of records.
    pub total: u64,
    /// Sum of record prices, rounded to 2 decimals.
    pub total_value: f64,
    /// `total_value / total` rounded to 2 decimals, 0 when empty.
    pub average_price: f64,
    /// Record count per category label.
    pub categories: BTreeMap<String, u64>,
    /// Wall-clock time of computation.
    pub computed_at: DateTime<Utc>,
}

impl AggregateSnapshot {
    /// Snapshot of an empty collection.
    pub fn empty(computed_at: DateTime<Utc>) -> Self {
        Self {
            total: 0,
            total_value: 0.0,
            average_price: 0.0,
            categories: BTreeMap::new(),
            computed_at,
        }
    }

    /// Sum of all category counts. Always equals `total`.
    pub fn categorized(&self) -> u64 {
        self.categories.values().sum()
    }
}

/// Round half away from zero to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute the aggregate stamped with the current time.
pub fn compute(records: &[Record]) -> AggregateSnapshot {
    compute_at(records, Utc::now())
}

/// Compute the aggregate with an explicit timestamp.
pub fn compute_at(records: &[Record], computed_at: DateTime<Utc>) -> AggregateSnapshot {
    if records.is_empty() {
        return AggregateSnapshot::empty(computed_at);
    }

    let mut sum = 0.0;
    let mut categories: BTreeMap<String, u64> = BTreeMap::new();
    for record in records {
        sum += record.numeric_price();
        *categories.entry(record.category_label()).or_insert(0) += 1;
    }

    let total = records.len() as u64;
    AggregateSnapshot {
        total,
        total_value: round2(sum),
        average_price: round2(sum / total as f64),
        categories,
        computed_at,
    }
}
