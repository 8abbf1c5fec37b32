//! Handler functions for every `/v1` route in §6.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use kvstore_core::StoreError;
use serde_json::json;

use crate::service::storage_service::{RemoveItemOptions, SetItemEntry, SetItemOptions};

use super::dto::{
    BatchGetRequest, BatchGetResponse, BatchPutRequest, BatchPutResponse, ItemBody,
    ListQueryParams, ListResponse, SetItemQuery, SetItemResponse,
};
use super::error::ApiError;
use super::state::AppState;

const IF_MATCH_HEADER: &str = "if-match";

fn if_match_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IF_MATCH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `GET /v1/healthz` — liveness. Always 200; only checks the process is running.
pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

/// `GET /v1/readyz` — readiness. 503 until the process is `Ready` and the
/// storage adapter reports healthy; returns 503 immediately during `Draining`
/// so load balancers stop routing traffic before the drain completes.
pub async fn readyz(State(state): State<AppState>) -> Response {
    use super::shutdown::HealthState;

    let state_name = state.shutdown.health_state();
    if state_name != HealthState::Ready {
        let body = Json(json!({"ok": false, "details": format!("{state_name:?}")}));
        return (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
    }

    let health = state.service.health().await;
    let body = Json(json!({"ok": health.ok, "details": health.details}));
    if health.ok {
        (StatusCode::OK, body).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}

/// `PUT /v1/items/:key`.
pub async fn put_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Query(query): Query<SetItemQuery>,
    Json(value): Json<serde_json::Value>,
) -> Result<Json<SetItemResponse>, ApiError> {
    let scope = state.identity.resolve(&headers)?;
    let item = state
        .service
        .set_item(
            &scope,
            &key,
            value,
            SetItemOptions {
                ttl_seconds: query.ttl_seconds,
                if_match: if_match_from_headers(&headers),
            },
        )
        .await?;
    Ok(Json(item.into()))
}

/// `GET /v1/items/:key`.
pub async fn get_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let scope = state.identity.resolve(&headers)?;
    let Some(item) = state.service.get_item(&scope, &key).await? else {
        return Err(ApiError(StoreError::NotFound));
    };

    let mut response = Json(item.value.clone()).into_response();
    let response_headers = response.headers_mut();
    if let Ok(etag) = item.etag().parse() {
        response_headers.insert("etag", etag);
    }
    if let Some(expires_at) = item.expires_at {
        if let Ok(value) = expires_at.to_rfc3339().parse() {
            response_headers.insert("x-expires-at", value);
        }
    }
    Ok(response)
}

/// `DELETE /v1/items/:key`.
pub async fn delete_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let scope = state.identity.resolve(&headers)?;
    let removed = state
        .service
        .remove_item(
            &scope,
            &key,
            RemoveItemOptions {
                if_match: if_match_from_headers(&headers),
            },
        )
        .await?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError(StoreError::NotFound))
    }
}

/// `POST /v1/items:batchGet`.
pub async fn batch_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BatchGetRequest>,
) -> Result<Json<BatchGetResponse>, ApiError> {
    let scope = state.identity.resolve(&headers)?;
    let items = state.service.batch_get(&scope, &request.keys).await?;
    let items = items
        .into_iter()
        .map(|(key, item)| (key, item.map(ItemBody::from)))
        .collect();
    Ok(Json(BatchGetResponse { items }))
}

/// `POST /v1/items:batchPut`.
pub async fn batch_put(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BatchPutRequest>,
) -> Result<Json<BatchPutResponse>, ApiError> {
    let scope = state.identity.resolve(&headers)?;
    let entries = request
        .entries
        .into_iter()
        .map(|entry| SetItemEntry {
            key: entry.key,
            value: entry.value,
            options: SetItemOptions {
                ttl_seconds: entry.ttl_seconds,
                if_match: entry.if_match,
            },
        })
        .collect();
    let items = state.service.batch_put(&scope, entries).await?;
    let items = items
        .into_iter()
        .map(|(key, item)| (key, ItemBody::from(item)))
        .collect();
    Ok(Json(BatchPutResponse { items }))
}

/// `GET /v1/items`.
pub async fn list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQueryParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let scope = state.identity.resolve(&headers)?;
    let result = state
        .service
        .list(&scope, query.prefix, query.cursor, query.limit)
        .await?;
    Ok(Json(ListResponse {
        items: result.items.into_iter().map(ItemBody::from).collect(),
        next_cursor: result.next_cursor,
    }))
}
