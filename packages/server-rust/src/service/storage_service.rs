//! The single entry point the HTTP edge calls: validates, then delegates to
//! the configured [`StorageAdapter`].

use std::collections::HashMap;
use std::sync::Arc;

use kvstore_core::{
    util::parse_if_match, BatchPutEntry, DeleteOptions, HealthStatus, ListQuery, ListResult,
    PutOptions, Scope, StoreError, StoredItem,
};
use tracing::instrument;

use super::limits::ServiceLimits;
use super::validation::{
    validate_batch_size, validate_key, validate_prefix, validate_ttl, validate_value,
};
use crate::storage::StorageAdapter;

/// Default `list` page size when the caller does not supply `limit`.
const DEFAULT_LIST_LIMIT: usize = 50;

/// Request options for `set_item`, expressed at the HTTP/service boundary
/// (`ifMatch` still a raw header string, not yet a parsed version).
#[derive(Debug, Clone, Default)]
pub struct SetItemOptions {
    pub ttl_seconds: Option<i64>,
    pub if_match: Option<String>,
}

/// Request options for `remove_item`.
#[derive(Debug, Clone, Default)]
pub struct RemoveItemOptions {
    pub if_match: Option<String>,
}

/// One entry of a `batch_put` request at the HTTP/service boundary.
#[derive(Debug, Clone)]
pub struct SetItemEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub options: SetItemOptions,
}

/// Validates requests and orchestrates calls to a [`StorageAdapter`].
///
/// Stateless given its adapter: every method takes the scope explicitly and
/// holds no per-request mutable state.
pub struct StorageService {
    adapter: Arc<dyn StorageAdapter>,
    limits: ServiceLimits,
}

impl StorageService {
    /// Builds a service over `adapter`, enforcing `limits`.
    #[must_use]
    pub fn new(adapter: Arc<dyn StorageAdapter>, limits: ServiceLimits) -> Self {
        Self { adapter, limits }
    }

    /// Returns the active item for `key`, or `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `key` fails validation, or
    /// whatever the adapter raises.
    #[instrument(skip(self))]
    pub async fn get_item(
        &self,
        scope: &Scope,
        key: &str,
    ) -> Result<Option<StoredItem>, StoreError> {
        validate_key(key, &self.limits)?;
        self.adapter.get(scope, key).await
    }

    /// Creates or updates `key`, applying the optimistic-concurrency and
    /// TTL rules described in `StorageAdapter::put`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the key, value, TTL, or
    /// `If-Match` header fails validation; [`StoreError::PreconditionFailed`]
    /// if `ifMatch` does not match the current version; or whatever the
    /// adapter raises.
    #[instrument(skip(self, value, options))]
    pub async fn set_item(
        &self,
        scope: &Scope,
        key: &str,
        value: serde_json::Value,
        options: SetItemOptions,
    ) -> Result<StoredItem, StoreError> {
        validate_key(key, &self.limits)?;
        validate_value(&value, &self.limits)?;
        validate_ttl(options.ttl_seconds)?;
        let if_match_version = parse_if_match(options.if_match.as_deref())?;

        self.adapter
            .put(
                scope,
                key,
                value,
                PutOptions {
                    ttl_seconds: options.ttl_seconds,
                    if_match_version,
                },
            )
            .await
    }

    /// Removes `key` if it exists and is active. Returns `true` iff a row
    /// was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the key or `If-Match` header
    /// fails validation; [`StoreError::PreconditionFailed`] if `ifMatch`
    /// does not match the current version; or whatever the adapter raises.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        scope: &Scope,
        key: &str,
        options: RemoveItemOptions,
    ) -> Result<bool, StoreError> {
        validate_key(key, &self.limits)?;
        let if_match_version = parse_if_match(options.if_match.as_deref())?;
        self.adapter
            .delete(scope, key, DeleteOptions { if_match_version })
            .await
    }

    /// Fetches every key in `keys`, returning `None` for absent or expired
    /// entries. The result key set equals the input key set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `keys` is empty, oversize, or
    /// contains an invalid key; or whatever the adapter raises.
    #[instrument(skip(self, keys))]
    pub async fn batch_get(
        &self,
        scope: &Scope,
        keys: &[String],
    ) -> Result<HashMap<String, Option<StoredItem>>, StoreError> {
        validate_batch_size(keys.len(), &self.limits)?;
        for key in keys {
            validate_key(key, &self.limits)?;
        }
        self.adapter.batch_get(scope, keys).await
    }

    /// Applies a `set_item` per entry, in declaration order. Not atomic
    /// across entries: a failing entry stops the batch, and entries before
    /// it remain committed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `entries` is empty, oversize,
    /// or any entry fails per-entry validation; [`StoreError::PreconditionFailed`]
    /// at the first entry whose `ifMatch` does not match; or whatever the
    /// adapter raises.
    #[instrument(skip(self, entries))]
    pub async fn batch_put(
        &self,
        scope: &Scope,
        entries: Vec<SetItemEntry>,
    ) -> Result<HashMap<String, StoredItem>, StoreError> {
        validate_batch_size(entries.len(), &self.limits)?;

        let mut core_entries = Vec::with_capacity(entries.len());
        for entry in entries {
            validate_key(&entry.key, &self.limits)?;
            validate_value(&entry.value, &self.limits)?;
            validate_ttl(entry.options.ttl_seconds)?;
            let if_match_version = parse_if_match(entry.options.if_match.as_deref())?;
            core_entries.push(BatchPutEntry {
                key: entry.key,
                value: entry.value,
                options: PutOptions {
                    ttl_seconds: entry.options.ttl_seconds,
                    if_match_version,
                },
            });
        }

        self.adapter.batch_put(scope, core_entries).await
    }

    /// Lists active items under `scope`, optionally filtered by `prefix`
    /// and paginated by `cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `prefix` exceeds the maximum
    /// key length or `cursor` fails to decode; or whatever the adapter
    /// raises.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        scope: &Scope,
        prefix: Option<String>,
        cursor: Option<String>,
        limit: Option<i64>,
    ) -> Result<ListResult, StoreError> {
        validate_prefix(prefix.as_deref(), &self.limits)?;
        let limit = kvstore_core::util::clamp_limit(
            limit,
            DEFAULT_LIST_LIMIT,
            self.limits.max_list_limit,
        );
        self.adapter
            .list(
                scope,
                ListQuery {
                    prefix,
                    cursor,
                    limit,
                },
            )
            .await
    }

    /// Pass-through health check.
    pub async fn health(&self) -> HealthStatus {
        self.adapter.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backends::sqlite_embedded;

    async fn service() -> StorageService {
        let adapter = sqlite_embedded::open_in_memory().await.unwrap();
        StorageService::new(Arc::new(adapter), ServiceLimits::for_tests())
    }

    fn scope() -> Scope {
        Scope::new("acme", "prefs", "u1").unwrap()
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let service = service().await;
        let value = serde_json::json!({"theme": "dark"});
        let written = service
            .set_item(&scope(), "k1", value.clone(), SetItemOptions::default())
            .await
            .unwrap();
        assert_eq!(written.version, 1);

        let read = service.get_item(&scope(), "k1").await.unwrap().unwrap();
        assert_eq!(read.value, value);
    }

    #[tokio::test]
    async fn set_item_rejects_oversize_value() {
        let service = service().await;
        let big = serde_json::Value::String("x".repeat(2_000_000));
        let err = service
            .set_item(&scope(), "k1", big, SetItemOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), kvstore_core::ErrorCode::Validation);
    }

    #[tokio::test]
    async fn set_item_with_mismatched_if_match_is_rejected() {
        let service = service().await;
        service
            .set_item(
                &scope(),
                "k1",
                serde_json::json!(1),
                SetItemOptions::default(),
            )
            .await
            .unwrap();

        let err = service
            .set_item(
                &scope(),
                "k1",
                serde_json::json!(2),
                SetItemOptions {
                    ttl_seconds: None,
                    if_match: Some("7".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), kvstore_core::ErrorCode::PreconditionFailed);
    }

    #[tokio::test]
    async fn remove_item_returns_false_for_missing_key() {
        let service = service().await;
        let removed = service
            .remove_item(&scope(), "missing", RemoveItemOptions::default())
            .await
            .unwrap();
        assert!(!removed);
    }

    #[tokio::test]
    async fn batch_get_returns_entry_per_requested_key() {
        let service = service().await;
        service
            .set_item(
                &scope(),
                "k1",
                serde_json::json!(1),
                SetItemOptions::default(),
            )
            .await
            .unwrap();

        let keys = vec!["k1".to_string(), "missing".to_string()];
        let results = service.batch_get(&scope(), &keys).await.unwrap();
        assert!(results["k1"].is_some());
        assert!(results["missing"].is_none());
    }

    #[tokio::test]
    async fn batch_get_rejects_empty_batch() {
        let service = service().await;
        assert!(service.batch_get(&scope(), &[]).await.is_err());
    }

    #[tokio::test]
    async fn batch_put_writes_every_entry() {
        let service = service().await;
        let entries = vec![
            SetItemEntry {
                key: "k1".to_string(),
                value: serde_json::json!(1),
                options: SetItemOptions::default(),
            },
            SetItemEntry {
                key: "k2".to_string(),
                value: serde_json::json!(2),
                options: SetItemOptions::default(),
            },
        ];
        let results = service.batch_put(&scope(), entries).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results["k1"].value, serde_json::json!(1));
    }

    #[tokio::test]
    async fn list_defaults_limit_when_absent() {
        let service = service().await;
        for i in 0..3 {
            service
                .set_item(
                    &scope(),
                    &format!("k{i}"),
                    serde_json::json!(i),
                    SetItemOptions::default(),
                )
                .await
                .unwrap();
        }
        let result = service.list(&scope(), None, None, None).await.unwrap();
        assert_eq!(result.items.len(), 3);
        assert!(result.next_cursor.is_none());
    }

    #[tokio::test]
    async fn list_rejects_oversize_prefix() {
        let service = service().await;
        let prefix = "p".repeat(256);
        let err = service
            .list(&scope(), Some(prefix), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), kvstore_core::ErrorCode::Validation);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let service = service().await;
        assert!(service.health().await.ok);
    }
}
