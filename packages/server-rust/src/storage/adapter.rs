//! The `StorageAdapter` contract every backend implements identically.
//!
//! Backends differ wildly in their native primitives (embedded SQLite,
//! SQL-over-HTTP, PostgreSQL, Redis) but must exhibit the same observable
//! behaviour: see each method's doc comment for the exact contract.

use std::collections::HashMap;

use async_trait::async_trait;
use kvstore_core::{
    BatchPutEntry, DeleteOptions, HealthStatus, ListQuery, ListResult, PutOptions, Scope,
    StoreError, StoredItem,
};

/// The capability set every storage backend realises.
///
/// Implementations are `Send + Sync` and are shared behind `Arc<dyn
/// StorageAdapter>`, since the storage service and HTTP edge are generic
/// over backend choice.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Returns the active item for `(scope, key)`, or `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on a backend I/O failure.
    async fn get(&self, scope: &Scope, key: &str) -> Result<Option<StoredItem>, StoreError>;

    /// Creates or updates the item at `(scope, key)`.
    ///
    /// Versioning, precondition, and expiry rules: if `options.if_match_version`
    /// is set, the current active item must exist with that exact version or
    /// this raises [`StoreError::PreconditionFailed`] and leaves the backend
    /// state unchanged. Otherwise this is an unconditional upsert: version
    /// becomes `current.version + 1` (or `1` for a fresh/expired key),
    /// `created_at` is preserved across updates, and `expires_at` is set from
    /// `options.ttl_seconds` or cleared if omitted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PreconditionFailed`] on a version mismatch, or
    /// [`StoreError::Internal`] on backend failure.
    async fn put(
        &self,
        scope: &Scope,
        key: &str,
        value: serde_json::Value,
        options: PutOptions,
    ) -> Result<StoredItem, StoreError>;

    /// Removes the item at `(scope, key)` if present and active.
    ///
    /// Returns `true` iff an active item existed and was removed; `false`
    /// if no active item existed (never an error for a missing key).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PreconditionFailed`] if `options.if_match_version`
    /// is set and does not match the current active version.
    async fn delete(
        &self,
        scope: &Scope,
        key: &str,
        options: DeleteOptions,
    ) -> Result<bool, StoreError>;

    /// Reads many keys in one call.
    ///
    /// The returned map has exactly one entry per distinct input key;
    /// absent or expired keys map to `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    async fn batch_get(
        &self,
        scope: &Scope,
        keys: &[String],
    ) -> Result<HashMap<String, Option<StoredItem>>, StoreError>;

    /// Applies `put` for each entry in declaration order.
    ///
    /// Not transactional: stops at the first failing entry and returns
    /// that error. Entries already committed before the failure remain
    /// committed in the backend.
    ///
    /// # Errors
    ///
    /// Returns the first entry's error: [`StoreError::PreconditionFailed`]
    /// or [`StoreError::Internal`].
    async fn batch_put(
        &self,
        scope: &Scope,
        entries: Vec<BatchPutEntry>,
    ) -> Result<HashMap<String, StoredItem>, StoreError>;

    /// Lists active items in a scope, ascending by key, optionally filtered
    /// by `prefix` and paginated via `cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure or
    /// [`StoreError::Validation`] if `query.cursor` fails to decode.
    async fn list(&self, scope: &Scope, query: ListQuery) -> Result<ListResult, StoreError>;

    /// A lightweight round-trip to the backend. Never errors; failures are
    /// conveyed through `HealthStatus::ok`.
    async fn health(&self) -> HealthStatus;

    /// Releases backend resources. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] only if releasing resources itself
    /// fails; callers should treat this as best-effort.
    async fn close(&self) -> Result<(), StoreError>;
}
