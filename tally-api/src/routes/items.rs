//! Item REST API Routes
//!
//! CRUD over the record store. Every successful write replaces the whole
//! collection, which publishes a change event that invalidates the
//! aggregate cache.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tally_core::Record;

use crate::{
    error::{ApiError, ApiResult},
    state::{AppState, SharedStore, WriteLock},
    types::{
        CreateItemRequest, ListItemsQuery, ListItemsResponse, Pagination, UpdateItemRequest,
        MAX_PAGE_SIZE,
    },
};

// ============================================================================
// HELPERS
// ============================================================================

/// Ids that do not parse can never match a stored record.
fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.trim().parse().map_err(|_| ApiError::item_not_found())
}

fn next_id(records: &[Record]) -> ApiResult<i64> {
    match records.iter().filter_map(|r| r.id).max() {
        None => Ok(1),
        Some(max) => max
            .checked_add(1)
            .ok_or_else(|| ApiError::internal_error("No item ids left to assign")),
    }
}

fn require_text(body: &Map<String, Value>, field: &str) -> ApiResult<String> {
    match body.get(field) {
        None | Some(Value::Null) => Err(ApiError::missing_field(field)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(_) => Err(ApiError::validation_failed(format!(
            "Field '{}' must be a non-empty string",
            field
        ))),
    }
}

fn require_number(body: &Map<String, Value>, field: &str) -> ApiResult<Value> {
    match body.get(field) {
        None | Some(Value::Null) => Err(ApiError::missing_field(field)),
        Some(value @ Value::Number(_)) => Ok(value.clone()),
        Some(_) => Err(ApiError::validation_failed(format!(
            "Field '{}' must be a number",
            field
        ))),
    }
}

fn into_object(body: Value) -> ApiResult<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::invalid_input("Request body must be a JSON object")),
    }
}

/// Filter by name and cut one page out of the result.
fn paginate(records: Vec<Record>, query: &ListItemsQuery) -> ApiResult<ListItemsResponse> {
    let needle = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);

    let matched: Vec<Record> = match needle {
        Some(needle) => records
            .into_iter()
            .filter(|r| {
                r.name
                    .as_deref()
                    .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .collect(),
        None => records,
    };

    let page = query.page.unwrap_or(1);
    if page == 0 {
        return Err(ApiError::invalid_range("page", 1, usize::MAX));
    }
    let limit = match query.limit {
        Some(0) => return Err(ApiError::invalid_range("limit", 1, MAX_PAGE_SIZE)),
        Some(limit) => limit.min(MAX_PAGE_SIZE),
        None => matched.len().clamp(1, MAX_PAGE_SIZE),
    };

    let total = matched.len();
    let items = matched
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();

    Ok(ListItemsResponse {
        items,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        },
    })
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/items - List items
#[utoipa::path(
    get,
    path = "/api/items",
    tag = "Items",
    params(
        ("q" = Option<String>, Query, description = "Case-insensitive name filter"),
        ("page" = Option<usize>, Query, description = "Page number, starting at 1"),
        ("limit" = Option<usize>, Query, description = "Page size, at most 500"),
    ),
    responses(
        (status = 200, description = "Page of items", body = ListItemsResponse),
        (status = 400, description = "Invalid pagination", body = ApiError),
    ),
)]
pub async fn list_items(
    State(store): State<SharedStore>,
    query: Result<Query<ListItemsQuery>, QueryRejection>,
) -> ApiResult<Json<ListItemsResponse>> {
    let Query(query) = query?;
    let records = store.load_for_write().await?;
    Ok(Json(paginate(records, &query)?))
}

/// GET /api/items/{id} - Get one item
#[utoipa::path(
    get,
    path = "/api/items/{id}",
    tag = "Items",
    params(("id" = i64, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item found", body = Record),
        (status = 404, description = "Item not found", body = ApiError),
    ),
)]
pub async fn get_item(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> ApiResult<Json<Record>> {
    let id = parse_id(&id)?;
    store
        .load_for_write()
        .await?
        .into_iter()
        .find(|r| r.id == Some(id))
        .map(Json)
        .ok_or_else(ApiError::item_not_found)
}

/// POST /api/items - Create an item
#[utoipa::path(
    post,
    path = "/api/items",
    tag = "Items",
    request_body = CreateItemRequest,
    responses(
        (status = 201, description = "Item created", body = Record),
        (status = 400, description = "Missing or invalid fields", body = ApiError),
    ),
)]
pub async fn create_item(
    State(store): State<SharedStore>,
    State(write_lock): State<WriteLock>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let body = into_object(body)?;

    let name = require_text(&body, "name")?;
    let category = require_text(&body, "category")?;
    let price = require_number(&body, "price")?;

    let _guard = write_lock.lock().await;
    let mut records = store.load_for_write().await?;

    let item = Record {
        id: Some(next_id(&records)?),
        name: Some(name),
        category: Some(Value::String(category)),
        price: Some(price),
        extra: Map::new(),
    };
    records.push(item.clone());
    store.replace_all(records).await?;

    tracing::info!(id = item.id, "Item created");
    Ok((StatusCode::CREATED, Json(item)))
}

/// PUT /api/items/{id} - Merge fields into an item
#[utoipa::path(
    put,
    path = "/api/items/{id}",
    tag = "Items",
    params(("id" = i64, Path, description = "Item ID")),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Item updated", body = Record),
        (status = 400, description = "Body is not a JSON object", body = ApiError),
        (status = 404, description = "Item not found", body = ApiError),
    ),
)]
pub async fn update_item(
    State(store): State<SharedStore>,
    State(write_lock): State<WriteLock>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Record>> {
    let id = parse_id(&id)?;
    let Json(body) = body?;
    let patch = into_object(body)?;

    let _guard = write_lock.lock().await;
    let mut records = store.load_for_write().await?;
    let item = records
        .iter_mut()
        .find(|r| r.id == Some(id))
        .ok_or_else(ApiError::item_not_found)?;

    item.merge(patch)?;
    item.set_id(id);
    let updated = item.clone();
    store.replace_all(records).await?;

    tracing::info!(id, "Item updated");
    Ok(Json(updated))
}

/// DELETE /api/items/{id} - Delete an item
#[utoipa::path(
    delete,
    path = "/api/items/{id}",
    tag = "Items",
    params(("id" = i64, Path, description = "Item ID")),
    responses(
        (status = 204, description = "Item deleted"),
        (status = 404, description = "Item not found", body = ApiError),
    ),
)]
pub async fn delete_item(
    State(store): State<SharedStore>,
    State(write_lock): State<WriteLock>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;

    let _guard = write_lock.lock().await;
    let mut records = store.load_for_write().await?;
    let before = records.len();
    records.retain(|r| r.id != Some(id));
    if records.len() == before {
        return Err(ApiError::item_not_found());
    }
    store.replace_all(records).await?;

    tracing::info!(id, "Item deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/:id", get(get_item).put(update_item).delete(delete_item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn catalog(count: i64) -> Vec<Record> {
        (1..=count)
            .map(|i| Record::new(i, format!("Item {}", i), "Misc", i as f64))
            .collect()
    }

    fn query(q: Option<&str>, page: Option<usize>, limit: Option<usize>) -> ListItemsQuery {
        ListItemsQuery {
            q: q.map(str::to_string),
            page,
            limit,
        }
    }

    #[test]
    fn test_next_id_skips_missing_ids() {
        assert_eq!(next_id(&[]).expect("id"), 1);
        let mut records = catalog(3);
        records.push(Record::default());
        assert_eq!(next_id(&records).expect("id"), 4);
    }

    #[test]
    fn test_next_id_exhausted_is_internal_error() {
        let records = vec![Record::new(i64::MAX, "Last", "Misc", 1.0)];
        let err = next_id(&records).expect_err("no id after i64::MAX");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_paginate_defaults_to_everything() {
        let page = paginate(catalog(7), &query(None, None, None)).expect("page");
        assert_eq!(page.items.len(), 7);
        assert_eq!(
            page.pagination,
            Pagination {
                page: 1,
                limit: 7,
                total: 7,
                total_pages: 1
            }
        );
    }

    #[test]
    fn test_paginate_last_partial_page() {
        let page = paginate(catalog(7), &query(None, Some(3), Some(3))).expect("page");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, Some(7));
        assert_eq!(page.pagination.total_pages, 3);
    }

    #[test]
    fn test_paginate_filters_case_insensitively() {
        let mut records = catalog(2);
        records.push(Record::new(3, "Standing DESK", "Office", 300.0));
        let page = paginate(records, &query(Some("desk"), None, None)).expect("page");
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.items[0].id, Some(3));
    }

    #[test]
    fn test_paginate_rejects_zero_page_and_limit() {
        assert!(paginate(catalog(2), &query(None, Some(0), None)).is_err());
        assert!(paginate(catalog(2), &query(None, None, Some(0))).is_err());
    }

    #[test]
    fn test_paginate_caps_limit() {
        let page = paginate(catalog(2), &query(None, None, Some(10_000))).expect("page");
        assert_eq!(page.pagination.limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_empty_store_has_no_pages() {
        let page = paginate(Vec::new(), &query(None, None, None)).expect("page");
        assert_eq!(page.pagination.limit, 1);
        assert_eq!(page.pagination.total_pages, 0);
    }

    #[test]
    fn test_field_validation() {
        let body = into_object(json!({"name": "", "category": 3, "price": "9"})).expect("object");
        assert!(require_text(&body, "name").is_err());
        assert!(require_text(&body, "category").is_err());
        assert!(require_number(&body, "price").is_err());
        assert!(require_text(&body, "missing").is_err());
        assert!(into_object(json!([1, 2])).is_err());
    }

    #[test]
    fn test_unparseable_id_is_not_found() {
        let err = parse_id("abc").expect_err("not an id");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(parse_id("42").ok(), Some(42));
    }

    proptest! {
        #[test]
        fn prop_pages_cover_every_item(count in 0i64..60, limit in 1usize..20) {
            let pages = (count as usize).div_ceil(limit);
            let mut seen = Vec::new();
            for page in 1..=pages.max(1) {
                let result = paginate(catalog(count), &query(None, Some(page), Some(limit)))
                    .expect("page");
                prop_assert_eq!(result.pagination.total_pages, pages);
                prop_assert!(result.items.len() <= limit);
                seen.extend(result.items.into_iter().filter_map(|r| r.id));
            }
            prop_assert_eq!(seen, (1..=count).collect::<Vec<_>>());
        }
    }
}
