//! Tally API Server Entry Point
//!
//! Bootstraps tracing and configuration, warms the aggregate cache and
//! starts the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use tally_api::telemetry::{init_tracing, TelemetryConfig};
use tally_api::{create_api_router, resolve_bind_addr, ApiConfig, ApiError, ApiResult, AppState};
use tally_storage::{CacheConfig, JsonFileRecordSource};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let cache_config = CacheConfig::from_env()
        .map_err(|e| ApiError::invalid_input(format!("Invalid cache configuration: {}", e)))?;
    let api_config = ApiConfig::from_env();

    let store = Arc::new(
        JsonFileRecordSource::new(&api_config.data_path)
            .with_poll_interval(api_config.watch_poll_interval),
    );
    let state = AppState::new(store, cache_config);
    let cache = state.cache.clone();

    match cache.warm().await {
        Ok(snapshot) => tracing::info!(total = snapshot.total, "Aggregate cache warmed"),
        Err(e) => tracing::warn!(error = %e, "Initial aggregate computation failed"),
    }

    let app: Router = create_api_router(state, &api_config);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, data_path = %api_config.data_path.display(), "Starting Tally API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    cache.shutdown();
    Ok(())
}
