//! Wire-format request/response bodies for the `/v1` routes. Kept separate
//! from `kvstore_core::StoredItem` so the core crate stays free of
//! HTTP-shaped naming (`camelCase`, `ifMatch`, `ttlSeconds`).

use chrono::{DateTime, Utc};
use kvstore_core::StoredItem;
use serde::{Deserialize, Serialize};

/// Response body for `PUT /v1/items/:key`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetItemResponse {
    pub key: String,
    pub etag: String,
    pub version: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StoredItem> for SetItemResponse {
    fn from(item: StoredItem) -> Self {
        Self {
            key: item.key,
            etag: item.etag(),
            version: item.version,
            expires_at: item.expires_at,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

/// One item as it appears inside a batch response map.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    pub value: serde_json::Value,
    pub etag: String,
    pub version: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StoredItem> for ItemBody {
    fn from(item: StoredItem) -> Self {
        Self {
            value: item.value,
            etag: item.etag(),
            version: item.version,
            expires_at: item.expires_at,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

/// Query parameters accepted by `PUT /v1/items/:key`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetItemQuery {
    pub ttl_seconds: Option<i64>,
}

/// Query parameters accepted by `GET /v1/items`.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListQueryParams {
    pub prefix: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// Request body for `POST /v1/items:batchGet`.
#[derive(Debug, Deserialize)]
pub struct BatchGetRequest {
    pub keys: Vec<String>,
}

/// Response body for `POST /v1/items:batchGet`.
#[derive(Debug, Serialize)]
pub struct BatchGetResponse {
    pub items: std::collections::HashMap<String, Option<ItemBody>>,
}

/// One entry of `POST /v1/items:batchPut`'s request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPutRequestEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub ttl_seconds: Option<i64>,
    pub if_match: Option<String>,
}

/// Request body for `POST /v1/items:batchPut`.
#[derive(Debug, Deserialize)]
pub struct BatchPutRequest {
    pub entries: Vec<BatchPutRequestEntry>,
}

/// Response body for `POST /v1/items:batchPut`.
#[derive(Debug, Serialize)]
pub struct BatchPutResponse {
    pub items: std::collections::HashMap<String, ItemBody>,
}

/// Response body for `GET /v1/items`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub items: Vec<ItemBody>,
    pub next_cursor: Option<String>,
}
