//! Health and OpenAPI endpoint tests.

use std::sync::Arc;

use axum::http::StatusCode;
use tally_api::{create_api_router, ApiConfig, AppState};
use tally_test_utils::fixtures::{fast_cache_config, reference_records};
use tally_test_utils::{InMemoryRecordSource, SourceError};

#[path = "support/app.rs"]
mod app;

use app::{test_app, TestApp};

#[tokio::test(start_paused = true)]
async fn ping_and_live() {
    let app = test_app(reference_records());

    let (status, body) = app.get("/health/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "pong");

    let (status, body) = app.get("/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test(start_paused = true)]
async fn ready_moves_from_degraded_to_healthy() {
    let app = test_app(reference_records());

    let (status, body) = app.get("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");

    app.get("/api/stats").await;
    let (status, body) = app.get("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["details"]["cache"]["status"], "healthy");
}

#[tokio::test(start_paused = true)]
async fn ready_is_unavailable_when_nothing_can_be_served() {
    let app = test_app(reference_records());
    app.store.fail_with(SourceError::unavailable("disk offline"));
    app.get("/api/stats").await;

    let (status, body) = app.get("/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test(start_paused = true)]
async fn ready_is_degraded_without_change_watching() {
    let store = Arc::new(InMemoryRecordSource::without_watch(reference_records()));
    let state = AppState::new(store.clone(), fast_cache_config());
    let app = TestApp {
        router: create_api_router(state.clone(), &ApiConfig::default()),
        store,
        state,
    };
    app.get("/api/stats").await;

    let (status, body) = app.get("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["details"]["change_watch"]["status"], "degraded");
    assert!(!app.state.cache.watch_available());
}

#[tokio::test(start_paused = true)]
async fn openapi_document_is_served() {
    let app = test_app(reference_records());
    let (status, body) = app.get("/api/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["info"]["title"], "Tally API");
    assert!(body["paths"]["/api/stats"].is_object());
    assert!(body["paths"]["/api/items/{id}"].is_object());
}
