//! Request and response types for the REST API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::Record;
use tally_storage::{CacheMetrics, StatsRead};
use utoipa::ToSchema;

/// Largest page the list route returns.
pub const MAX_PAGE_SIZE: usize = 500;

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsQuery {
    /// Exactly `"true"` forces a recompute.
    pub refresh: Option<String>,
}

impl StatsQuery {
    pub fn force_refresh(&self) -> bool {
        self.refresh.as_deref() == Some("true")
    }
}

/// Aggregate statistics with cache metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total: u64,
    pub total_value: f64,
    pub average_price: f64,
    pub categories: BTreeMap<String, u64>,
    /// When the served snapshot was computed.
    pub last_updated: DateTime<Utc>,
    /// True when no recompute ran for this request.
    pub cached: bool,
    /// Milliseconds since the served snapshot was computed.
    pub cache_age: u64,
}

impl From<&StatsRead> for StatsResponse {
    fn from(read: &StatsRead) -> Self {
        let snapshot = read.snapshot();
        Self {
            total: snapshot.total,
            total_value: snapshot.total_value,
            average_price: snapshot.average_price,
            categories: snapshot.categories.clone(),
            last_updated: snapshot.computed_at,
            cached: read.served_from_cache(),
            cache_age: read.cache_age().as_millis() as u64,
        }
    }
}

/// Cache counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatusResponse {
    pub hits: u64,
    pub misses: u64,
    pub recomputations: u64,
    pub coalesced: u64,
    pub failures: u64,
    pub stale_served: u64,
    pub invalidations: u64,
    pub hit_rate: f64,
    pub watch_available: bool,
    pub has_snapshot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<CacheMetrics> for CacheStatusResponse {
    fn from(metrics: CacheMetrics) -> Self {
        Self {
            hit_rate: metrics.hit_rate(),
            hits: metrics.hits,
            misses: metrics.misses,
            recomputations: metrics.recomputations,
            coalesced: metrics.coalesced,
            failures: metrics.failures,
            stale_served: metrics.stale_served,
            invalidations: metrics.invalidations,
            watch_available: metrics.watch_available,
            has_snapshot: metrics.has_snapshot,
            last_error: metrics.last_error,
        }
    }
}

// ============================================================================
// ITEMS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListItemsQuery {
    /// Case-insensitive substring match on name.
    pub q: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ListItemsResponse {
    pub items: Vec<Record>,
    pub pagination: Pagination,
}

/// Body of `POST /api/items`. Documented shape only; handlers validate the
/// raw JSON so that type errors produce a 400 with a field message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateItemRequest {
    pub name: String,
    pub category: String,
    pub price: f64,
}

/// Body of `PUT /api/items/{id}`. Any JSON object is accepted and merged;
/// these are the fields the aggregate reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tally_core::AggregateSnapshot;
    use tally_storage::ReadOrigin;

    #[test]
    fn test_refresh_flag_is_exact() {
        let query = |v: &str| StatsQuery {
            refresh: Some(v.to_string()),
        };
        assert!(query("true").force_refresh());
        assert!(!query("TRUE").force_refresh());
        assert!(!query("1").force_refresh());
        assert!(!StatsQuery::default().force_refresh());
    }

    #[test]
    fn test_stats_response_field_names() {
        let snapshot = Arc::new(AggregateSnapshot::empty(Utc::now()));
        let read = StatsRead::new(snapshot, Duration::from_millis(4000), ReadOrigin::Cache);
        let json = serde_json::to_value(StatsResponse::from(&read)).expect("serialize");

        assert_eq!(json["cached"], true);
        assert_eq!(json["cacheAge"], 4000);
        assert!(json.get("totalValue").is_some());
        assert!(json.get("averagePrice").is_some());
        assert!(json["lastUpdated"].is_string());
    }

    #[test]
    fn test_cache_status_omits_missing_error() {
        let status = CacheStatusResponse::from(CacheMetrics::default());
        let json = serde_json::to_value(status).expect("serialize");
        assert!(json.get("lastError").is_none());
        assert_eq!(json["staleServed"], 0);
        assert_eq!(json["hitRate"], 0.0);
    }
}
