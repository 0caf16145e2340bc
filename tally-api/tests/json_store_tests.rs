//! Router over a JSON file store, on the real clock.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tally_api::{create_api_router, ApiConfig, AppState};
use tally_storage::{CacheConfig, JsonFileRecordSource};
use tally_test_utils::fixtures::reference_records;
use tempfile::TempDir;

#[path = "support/app.rs"]
mod app;

use app::send;

fn file_app(path: &Path) -> (Router, AppState) {
    let store = Arc::new(
        JsonFileRecordSource::new(path).with_poll_interval(Duration::from_millis(10)),
    );
    let config = CacheConfig::new().with_debounce_window(Duration::from_millis(30));
    let state = AppState::new(store, config);
    (create_api_router(state.clone(), &ApiConfig::default()), state)
}

async fn stats_total(router: &Router) -> Value {
    send(router, Method::GET, "/api/stats", None).await.1["total"].clone()
}

#[tokio::test]
async fn missing_file_reads_empty_and_first_write_creates_it() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("nested").join("items.json");
    let (router, state) = file_app(&path);

    let (status, body) = send(&router, Method::GET, "/api/items", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 0);

    // Stats on a missing file is a cold source failure.
    let (status, _) = send(&router, Method::GET, "/api/stats", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, created) = send(
        &router,
        Method::POST,
        "/api/items",
        Some(json!({"name": "Lamp", "category": "Home", "price": 45})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 1);

    let raw = std::fs::read_to_string(&path).expect("file written");
    let on_disk: Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(on_disk, json!([created]));

    let (status, body) = send(&router, Method::GET, "/api/stats?refresh=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    state.cache.shutdown();
}

#[tokio::test]
async fn external_edit_reaches_stats() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("items.json");
    let seed = serde_json::to_string(&reference_records()).expect("json");
    std::fs::write(&path, seed).expect("seed");

    let (router, state) = file_app(&path);
    state.cache.warm().await.expect("warm");
    assert_eq!(stats_total(&router).await, 3);

    // Let the poller record its baseline.
    tokio::time::sleep(Duration::from_millis(50)).await;
    std::fs::write(&path, r#"[{"id": 1, "name": "Solo", "price": 5}]"#).expect("edit");

    let started = std::time::Instant::now();
    while stats_total(&router).await != 1 {
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "edit never observed"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    state.cache.shutdown();
}
