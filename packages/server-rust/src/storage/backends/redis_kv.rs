//! Key-value backend with no native multi-row transactions: Redis.
//!
//! Each primary key maps to one Redis string holding a JSON envelope with
//! every [`StoredItem`] field. Optimistic updates use `WATCH`/`MULTI`/`EXEC`:
//! watch the key, read+decide, queue the write, execute; a `nil` `EXEC`
//! result means another client changed the key first, so the whole
//! read-decide-write cycle retries up to [`MAX_CAS_ATTEMPTS`] times.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kvstore_core::{
    BatchPutEntry, DeleteOptions, HealthStatus, ListQuery, ListResult, PutOptions, Scope,
    StoreError, StoredItem,
};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::storage::adapter::StorageAdapter;

/// Retry budget for a `WATCH`/`MULTI`/`EXEC` conflict. Chosen to absorb a
/// burst of concurrent writers to the same key without looping forever.
const MAX_CAS_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    value: serde_json::Value,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl Envelope {
    fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |e| e > now)
    }

    fn into_item(self, key: &str) -> StoredItem {
        StoredItem {
            key: key.to_string(),
            value: self.value,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        }
    }
}

/// `StorageAdapter` implementation backed by Redis.
///
/// `client` hands out a fresh connection for every `WATCH`/`MULTI`/`EXEC`
/// cycle: that protocol's state (the watch set, the queued command buffer)
/// lives on the one physical connection it runs on, so two concurrent
/// callers sharing a connection can interleave their `WATCH`/`GET`/`MULTI`
/// sequences and corrupt each other's compare-and-swap. `conn`, the shared
/// auto-reconnecting `ConnectionManager`, stays reserved for single
/// round-trip commands (`GET`, `SCAN`, `PING`, `DEL`) that have no such
/// cross-request state to corrupt.
pub struct RedisAdapter {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisAdapter {
    /// Connects to `redis_url`, establishing an auto-reconnecting
    /// multiplexed connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial connection fails.
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { client, conn })
    }

    fn backend_key(scope: &Scope, key: &str) -> String {
        format!("{}{key}", scope.backend_prefix())
    }

    /// Opens a connection dedicated to a single logical caller's use. Used
    /// for `WATCH`/`MULTI`/`EXEC` cycles, which must not share their
    /// protocol state with any other concurrent transaction.
    async fn dedicated_connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::internal_from("failed to open connection", e))
    }

    async fn read_envelope<C>(
        &self,
        conn: &mut C,
        backend_key: &str,
    ) -> Result<Option<Envelope>, StoreError>
    where
        C: redis::aio::ConnectionLike + Send,
    {
        let raw: Option<String> = conn
            .get(backend_key)
            .await
            .map_err(|e| StoreError::internal_from("failed to read key", e))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let envelope: Envelope = serde_json::from_str(&raw)
            .map_err(|e| StoreError::internal_from("stored envelope is not valid JSON", e))?;
        Ok(Some(envelope))
    }
}

#[async_trait]
impl StorageAdapter for RedisAdapter {
    #[instrument(skip(self, key))]
    async fn get(&self, scope: &Scope, key: &str) -> Result<Option<StoredItem>, StoreError> {
        let mut conn = self.conn.clone();
        let backend_key = Self::backend_key(scope, key);
        let Some(envelope) = self.read_envelope(&mut conn, &backend_key).await? else {
            return Ok(None);
        };
        if envelope.is_active_at(Utc::now()) {
            Ok(Some(envelope.into_item(key)))
        } else {
            let _: Result<(), _> = conn.del(&backend_key).await;
            Ok(None)
        }
    }

    #[instrument(skip(self, key, value))]
    async fn put(
        &self,
        scope: &Scope,
        key: &str,
        value: serde_json::Value,
        options: PutOptions,
    ) -> Result<StoredItem, StoreError> {
        let mut conn = self.dedicated_connection().await?;
        let backend_key = Self::backend_key(scope, key);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let () = redis::cmd("WATCH")
                .arg(&backend_key)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::internal_from("failed to watch key", e))?;

            let current = self.read_envelope(&mut conn, &backend_key).await?;
            let now = Utc::now();
            let active = current
                .as_ref()
                .filter(|envelope| envelope.is_active_at(now));

            if let Some(expected) = options.if_match_version {
                match active {
                    Some(envelope) if envelope.version == expected => {}
                    Some(envelope) => {
                        let version = envelope.version;
                        let _: Result<(), _> = redis::cmd("UNWATCH").query_async(&mut conn).await;
                        return Err(StoreError::precondition_failed(format!(
                            "expected version {expected}, found {version}"
                        )));
                    }
                    None => {
                        let _: Result<(), _> = redis::cmd("UNWATCH").query_async(&mut conn).await;
                        return Err(StoreError::precondition_failed(format!(
                            "expected version {expected}, item does not exist"
                        )));
                    }
                }
            }

            let version = active.map_or(1, |e| e.version + 1);
            let created_at = active.map_or(now, |e| e.created_at);
            let expires_at = options
                .ttl_seconds
                .map(|s| now + chrono::Duration::seconds(s));

            let envelope = Envelope {
                value: value.clone(),
                version,
                created_at,
                updated_at: now,
                expires_at,
            };
            let serialized = serde_json::to_string(&envelope)
                .map_err(|e| StoreError::internal_from("failed to serialize envelope", e))?;

            let mut pipe = redis::pipe();
            pipe.atomic().set(&backend_key, &serialized);
            let result: Option<()> = pipe
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::internal_from("failed to commit transaction", e))?;

            if result.is_some() {
                return Ok(envelope.into_item(key));
            }
            // EXEC returned nil: the watched key changed concurrently. Retry.
        }

        Err(StoreError::precondition_failed(format!(
            "exceeded {MAX_CAS_ATTEMPTS} retries for concurrent update of {key}"
        )))
    }

    #[instrument(skip(self, key))]
    async fn delete(
        &self,
        scope: &Scope,
        key: &str,
        options: DeleteOptions,
    ) -> Result<bool, StoreError> {
        let mut conn = self.dedicated_connection().await?;
        let backend_key = Self::backend_key(scope, key);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let () = redis::cmd("WATCH")
                .arg(&backend_key)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::internal_from("failed to watch key", e))?;

            let current = self.read_envelope(&mut conn, &backend_key).await?;
            let now = Utc::now();
            let Some(envelope) = current.filter(|e| e.is_active_at(now)) else {
                let _: Result<(), _> = redis::cmd("UNWATCH").query_async(&mut conn).await;
                return Ok(false);
            };

            if let Some(expected) = options.if_match_version {
                if envelope.version != expected {
                    let _: Result<(), _> = redis::cmd("UNWATCH").query_async(&mut conn).await;
                    return Err(StoreError::precondition_failed(format!(
                        "expected version {expected}, found {}",
                        envelope.version
                    )));
                }
            }

            let mut pipe = redis::pipe();
            pipe.atomic().del(&backend_key);
            let result: Option<()> = pipe
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::internal_from("failed to commit transaction", e))?;

            if result.is_some() {
                return Ok(true);
            }
        }

        Err(StoreError::precondition_failed(format!(
            "exceeded {MAX_CAS_ATTEMPTS} retries for concurrent delete of {key}"
        )))
    }

    async fn batch_get(
        &self,
        scope: &Scope,
        keys: &[String],
    ) -> Result<HashMap<String, Option<StoredItem>>, StoreError> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            let item = self.get(scope, key).await?;
            out.insert(key.clone(), item);
        }
        Ok(out)
    }

    async fn batch_put(
        &self,
        scope: &Scope,
        entries: Vec<BatchPutEntry>,
    ) -> Result<HashMap<String, StoredItem>, StoreError> {
        let mut out = HashMap::with_capacity(entries.len());
        for entry in entries {
            let item = self
                .put(scope, &entry.key, entry.value, entry.options)
                .await?;
            out.insert(entry.key, item);
        }
        Ok(out)
    }

    #[instrument(skip(self, query))]
    async fn list(&self, scope: &Scope, query: ListQuery) -> Result<ListResult, StoreError> {
        let mut conn = self.conn.clone();
        let scan_pattern = format!(
            "{}{}*",
            escape_glob(&scope.backend_prefix()),
            escape_glob(query.prefix.as_deref().unwrap_or(""))
        );
        let cursor_key = query
            .cursor
            .as_deref()
            .map(kvstore_core::util::decode_cursor)
            .transpose()?;

        let mut matched_keys: Vec<String> = Vec::new();
        let mut scan_cursor: u64 = 0;
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(scan_cursor)
                .arg("MATCH")
                .arg(&scan_pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::internal_from("failed to scan keys", e))?;
            matched_keys.extend(batch);
            scan_cursor = next_cursor;
            if scan_cursor == 0 {
                break;
            }
        }

        let prefix_len = scope.backend_prefix().len();
        let now = Utc::now();
        let mut items = Vec::new();
        for backend_key in matched_keys {
            let key = backend_key[prefix_len..].to_string();
            if let Some(cursor_key) = &cursor_key {
                if key.as_str() <= cursor_key.as_str() {
                    continue;
                }
            }
            if let Some(envelope) = self.read_envelope(&mut conn, &backend_key).await? {
                if envelope.is_active_at(now) {
                    items.push(envelope.into_item(&key));
                }
            }
        }

        items.sort_by(|a, b| a.key.cmp(&b.key));

        let next_cursor = if items.len() > query.limit {
            items.truncate(query.limit);
            items
                .last()
                .map(|item| kvstore_core::util::encode_cursor(&item.key))
        } else {
            None
        };

        Ok(ListResult { items, next_cursor })
    }

    async fn health(&self) -> HealthStatus {
        let mut conn = self.conn.clone();
        match redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
        {
            Ok(_) => HealthStatus::healthy(),
            Err(e) => {
                warn!(error = %e, "redis health check failed");
                HealthStatus::unhealthy(e.to_string())
            }
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Escapes `SCAN MATCH` glob metacharacters so a tenant/namespace/user/prefix
/// value containing `*`, `?`, `[`, or `]` is matched literally.
fn escape_glob(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
