//! Stats REST API Routes
//!
//! Serves the cached aggregate and exposes the cache's counters and a manual
//! invalidation hook.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tally_storage::AggregateCache;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    types::{CacheStatusResponse, StatsQuery, StatsResponse},
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/stats - Aggregate statistics
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "Stats",
    params(
        ("refresh" = Option<String>, Query, description = "Set to \"true\" to force a recompute"),
    ),
    responses(
        (status = 200, description = "Aggregate statistics", body = StatsResponse),
        (status = 500, description = "Record source is malformed and nothing is cached", body = ApiError),
        (status = 503, description = "Record source is unreadable and nothing is cached", body = ApiError),
    ),
)]
pub async fn get_stats(
    State(cache): State<AggregateCache>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> ApiResult<Json<StatsResponse>> {
    let Query(query) = query?;
    let read = cache.get(query.force_refresh()).await?;

    tracing::debug!(
        origin = ?read.origin(),
        cache_age_ms = read.cache_age().as_millis() as u64,
        "Served stats"
    );

    Ok(Json(StatsResponse::from(&read)))
}

/// GET /api/stats/cache - Cache counters
#[utoipa::path(
    get,
    path = "/api/stats/cache",
    tag = "Stats",
    responses(
        (status = 200, description = "Cache counters", body = CacheStatusResponse),
    ),
)]
pub async fn get_cache_status(State(cache): State<AggregateCache>) -> Json<CacheStatusResponse> {
    Json(cache.metrics().into())
}

/// POST /api/stats/invalidate - Mark the cache stale and recompute in the background
#[utoipa::path(
    post,
    path = "/api/stats/invalidate",
    tag = "Stats",
    responses(
        (status = 202, description = "Recompute scheduled"),
    ),
)]
pub async fn invalidate_stats(State(cache): State<AggregateCache>) -> impl IntoResponse {
    cache.invalidate();
    StatusCode::ACCEPTED
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_stats))
        .route("/cache", get(get_cache_status))
        .route("/invalidate", post(invalidate_stats))
}
