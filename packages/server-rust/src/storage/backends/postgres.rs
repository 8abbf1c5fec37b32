//! Networked relational SQL backend: `PostgreSQL` via `sqlx`.
//!
//! Unlike the `libsql` backends, the optimistic-concurrency check locks the
//! candidate row with `SELECT ... FOR UPDATE` inside a transaction rather
//! than relying on a whole-connection mutex, since `sqlx::PgPool` is
//! designed for concurrent use from many tasks at once.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use kvstore_core::{
    BatchPutEntry, DeleteOptions, HealthStatus, ListQuery, ListResult, PutOptions, Scope,
    StoreError, StoredItem,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{instrument, warn};

use crate::storage::adapter::StorageAdapter;

/// `StorageAdapter` implementation backed by a `PostgreSQL` connection pool.
pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    /// Connects to `database_url` with a bounded connection pool and runs
    /// schema migration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached or migration fails.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let adapter = Self { pool };
        adapter.run_migrations().await?;
        Ok(adapter)
    }

    async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS items (
                tenant_id  TEXT NOT NULL,
                namespace  TEXT NOT NULL,
                user_id    TEXT NOT NULL,
                key        TEXT NOT NULL,
                value_json JSONB NOT NULL,
                version    BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ,
                PRIMARY KEY (tenant_id, namespace, user_id, key)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_expiry ON items(expires_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

struct ItemRow {
    value_json: serde_json::Value,
    version: i64,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    expires_at: Option<chrono::DateTime<Utc>>,
}

fn row_into_item(key: &str, row: ItemRow) -> StoredItem {
    StoredItem {
        key: key.to_string(),
        value: row.value_json,
        version: row.version,
        created_at: row.created_at,
        updated_at: row.updated_at,
        expires_at: row.expires_at,
    }
}

#[async_trait]
impl StorageAdapter for PostgresAdapter {
    #[instrument(skip(self, key))]
    async fn get(&self, scope: &Scope, key: &str) -> Result<Option<StoredItem>, StoreError> {
        let row = sqlx::query(
            "SELECT value_json, version, created_at, updated_at, expires_at FROM items
             WHERE tenant_id = $1 AND namespace = $2 AND user_id = $3 AND key = $4
               AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(&scope.tenant_id)
        .bind(&scope.namespace)
        .bind(&scope.user_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::internal_from("failed to query item", e))?;

        Ok(row.map(|row| {
            row_into_item(
                key,
                ItemRow {
                    value_json: row.get("value_json"),
                    version: row.get("version"),
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                    expires_at: row.get("expires_at"),
                },
            )
        }))
    }

    #[instrument(skip(self, key, value))]
    async fn put(
        &self,
        scope: &Scope,
        key: &str,
        value: serde_json::Value,
        options: PutOptions,
    ) -> Result<StoredItem, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::internal_from("failed to start transaction", e))?;

        let current = sqlx::query(
            "SELECT version, created_at, expires_at FROM items
             WHERE tenant_id = $1 AND namespace = $2 AND user_id = $3 AND key = $4
             FOR UPDATE",
        )
        .bind(&scope.tenant_id)
        .bind(&scope.namespace)
        .bind(&scope.user_id)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::internal_from("failed to lock item row", e))?;

        let now = Utc::now();
        let active = current.as_ref().and_then(|row| {
            let version: i64 = row.get("version");
            let created_at: chrono::DateTime<Utc> = row.get("created_at");
            let expires_at: Option<chrono::DateTime<Utc>> = row.get("expires_at");
            let is_active = expires_at.map_or(true, |e| e > now);
            is_active.then_some((version, created_at))
        });

        if let Some(expected) = options.if_match_version {
            match active {
                Some((version, _)) if version == expected => {}
                Some((version, _)) => {
                    return Err(StoreError::precondition_failed(format!(
                        "expected version {expected}, found {version}"
                    )));
                }
                None => {
                    return Err(StoreError::precondition_failed(format!(
                        "expected version {expected}, item does not exist"
                    )));
                }
            }
        }

        let version = active.map_or(1, |(v, _)| v + 1);
        let created_at = active.map_or(now, |(_, c)| c);
        let expires_at = options
            .ttl_seconds
            .map(|s| now + chrono::Duration::seconds(s));

        sqlx::query(
            "INSERT INTO items
             (tenant_id, namespace, user_id, key, value_json, version, created_at, updated_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (tenant_id, namespace, user_id, key) DO UPDATE SET
               value_json = EXCLUDED.value_json,
               version = EXCLUDED.version,
               created_at = EXCLUDED.created_at,
               updated_at = EXCLUDED.updated_at,
               expires_at = EXCLUDED.expires_at",
        )
        .bind(&scope.tenant_id)
        .bind(&scope.namespace)
        .bind(&scope.user_id)
        .bind(key)
        .bind(&value)
        .bind(version)
        .bind(created_at)
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::internal_from("failed to upsert item", e))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::internal_from("failed to commit put", e))?;

        Ok(StoredItem {
            key: key.to_string(),
            value,
            version,
            created_at,
            updated_at: now,
            expires_at,
        })
    }

    #[instrument(skip(self, key))]
    async fn delete(
        &self,
        scope: &Scope,
        key: &str,
        options: DeleteOptions,
    ) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::internal_from("failed to start transaction", e))?;

        let current = sqlx::query(
            "SELECT version, expires_at FROM items
             WHERE tenant_id = $1 AND namespace = $2 AND user_id = $3 AND key = $4
             FOR UPDATE",
        )
        .bind(&scope.tenant_id)
        .bind(&scope.namespace)
        .bind(&scope.user_id)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::internal_from("failed to lock item row", e))?;

        let now = Utc::now();
        let Some(row) = current else {
            return Ok(false);
        };
        let version: i64 = row.get("version");
        let expires_at: Option<chrono::DateTime<Utc>> = row.get("expires_at");
        if !expires_at.map_or(true, |e| e > now) {
            return Ok(false);
        }

        if let Some(expected) = options.if_match_version {
            if version != expected {
                return Err(StoreError::precondition_failed(format!(
                    "expected version {expected}, found {version}"
                )));
            }
        }

        sqlx::query(
            "DELETE FROM items WHERE tenant_id = $1 AND namespace = $2 AND user_id = $3 AND key = $4",
        )
        .bind(&scope.tenant_id)
        .bind(&scope.namespace)
        .bind(&scope.user_id)
        .bind(key)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::internal_from("failed to delete item", e))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::internal_from("failed to commit delete", e))?;

        Ok(true)
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
        let cursor_key = query
            .cursor
            .as_deref()
            .map(kvstore_core::util::decode_cursor)
            .transpose()?;
        let like_prefix = query.prefix.as_deref().map(|p| format!("{}%", escape_like(p)));
        #[allow(clippy::cast_possible_wrap)]
        let fetch_limit = (query.limit + 1) as i64;

        let rows = sqlx::query(
            "SELECT key, value_json, version, created_at, updated_at, expires_at FROM items
             WHERE tenant_id = $1 AND namespace = $2 AND user_id = $3
               AND (expires_at IS NULL OR expires_at > now())
               AND ($4::text IS NULL OR key LIKE $4 ESCAPE '\\')
               AND ($5::text IS NULL OR key > $5)
             ORDER BY key ASC
             LIMIT $6",
        )
        .bind(&scope.tenant_id)
        .bind(&scope.namespace)
        .bind(&scope.user_id)
        .bind(&like_prefix)
        .bind(&cursor_key)
        .bind(fetch_limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::internal_from("failed to list items", e))?;

        let mut items: Vec<StoredItem> = rows
            .into_iter()
            .map(|row| {
                let key: String = row.get("key");
                row_into_item(
                    &key,
                    ItemRow {
                        value_json: row.get("value_json"),
                        version: row.get("version"),
                        created_at: row.get("created_at"),
                        updated_at: row.get("updated_at"),
                        expires_at: row.get("expires_at"),
                    },
                )
            })
            .collect();

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
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => HealthStatus::healthy(),
            Err(e) => {
                warn!(error = %e, "postgres health check failed");
                HealthStatus::unhealthy(e.to_string())
            }
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
