//! Health Check Endpoints
//!
//! - /health/ping - Simple liveness check
//! - /health/live - Process alive check
//! - /health/ready - Aggregate cache readiness

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tally_storage::CacheMetrics;

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthDetails {
    pub cache: ComponentHealth,
    pub change_watch: ComponentHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            error: None,
        }
    }
}

/// Readiness from the cache's counters.
///
/// Unhealthy only when nothing can be served: no snapshot and the last
/// attempt failed. Anything short of that still answers requests.
pub fn assess(metrics: &CacheMetrics) -> (HealthStatus, ComponentHealth, ComponentHealth) {
    let cache = match (metrics.has_snapshot, &metrics.last_error) {
        (true, None) => ComponentHealth::healthy(),
        (true, Some(err)) => ComponentHealth {
            status: HealthStatus::Degraded,
            error: Some(err.clone()),
        },
        (false, None) => ComponentHealth {
            status: HealthStatus::Degraded,
            error: Some("No snapshot computed yet".to_string()),
        },
        (false, Some(err)) => ComponentHealth {
            status: HealthStatus::Unhealthy,
            error: Some(err.clone()),
        },
    };

    let change_watch = if metrics.watch_available {
        ComponentHealth::healthy()
    } else {
        ComponentHealth {
            status: HealthStatus::Degraded,
            error: Some("Change watching unavailable, refreshing on TTL only".to_string()),
        }
    };

    let overall = match (cache.status, change_watch.status) {
        (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
        (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    };

    (overall, cache, change_watch)
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
#[utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses(
        (status = 200, description = "Service is responding", body = String),
    ),
)]
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = HealthResponse),
    ),
)]
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check (aggregate cache)
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service can serve stats", body = HealthResponse),
        (status = 503, description = "Nothing cached and the record source is failing", body = HealthResponse),
    ),
)]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let (status, cache, change_watch) = assess(&state.cache.metrics());

    let response = HealthResponse {
        status,
        message: None,
        details: Some(HealthDetails {
            cache,
            change_watch,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}
