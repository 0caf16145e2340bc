//! OpenAPI Specification for the Tally API
//!
//! Generated by utoipa from the route annotations and schema derives.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::{self, ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{items, stats};
use crate::types::*;
use tally_core::Record;

/// OpenAPI document for the Tally API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tally API",
        description = "Cached aggregate statistics over a record collection, plus record CRUD",
    ),
    servers(
        (url = "http://localhost:3001", description = "Local Development")
    ),
    tags(
        (name = "Stats", description = "Cached aggregate statistics"),
        (name = "Items", description = "Record CRUD; writes invalidate the stats cache"),
        (name = "Health", description = "Liveness and readiness checks")
    ),
    paths(
        // === Stats Routes ===
        stats::get_stats,
        stats::get_cache_status,
        stats::invalidate_stats,

        // === Item Routes ===
        items::list_items,
        items::get_item,
        items::create_item,
        items::update_item,
        items::delete_item,

        // === Health Routes ===
        health::ping,
        health::liveness,
        health::readiness,
    ),
    components(
        schemas(
            // Errors
            ApiError,
            ErrorCode,

            // Stats
            StatsResponse,
            CacheStatusResponse,

            // Items
            Record,
            CreateItemRequest,
            UpdateItemRequest,
            ListItemsResponse,
            Pagination,

            // Health
            HealthResponse,
            HealthStatus,
            HealthDetails,
            ComponentHealth,
        )
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Pretty-printed JSON document.
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generates() -> Result<(), serde_json::Error> {
        let json = ApiDoc::to_json()?;
        assert!(json.contains("Tally API"));
        assert!(json.contains("StatsResponse"));
        assert!(json.contains("cacheAge"));
        Ok(())
    }
}
