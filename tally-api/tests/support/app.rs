#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tally_api::{create_api_router, ApiConfig, AppState};
use tally_test_utils::fixtures::fast_cache_config;
use tally_test_utils::{InMemoryRecordSource, Record};
use tower::ServiceExt;

/// Router over an in-memory store, with handles to both.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryRecordSource>,
    pub state: AppState,
}

/// Must be called inside a Tokio runtime.
pub fn test_app(records: Vec<Record>) -> TestApp {
    let store = Arc::new(InMemoryRecordSource::new(records));
    let state = AppState::new(store.clone(), fast_cache_config());
    let router = create_api_router(state.clone(), &ApiConfig::default());
    TestApp {
        router,
        store,
        state,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        send(&self.router, Method::GET, uri, None).await
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        send(&self.router, method, uri, body).await
    }
}

/// Run one request through `router`. Non-JSON bodies come back as strings,
/// empty bodies as null.
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = router.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");

    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}
