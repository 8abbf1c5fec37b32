//! Shared `items` table logic for the two `libsql`-backed adapters.
//!
//! Both the embedded SQLite backend (`libsql::Builder::new_local`) and the
//! remote SQL-over-HTTP backend (`libsql::Builder::new_remote`, Hrana) speak
//! the same `?`-placeholder SQL dialect through `libsql::Connection`, so the
//! query logic lives here once; each backend file only differs in how it
//! builds the connection.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use kvstore_core::{
    BatchPutEntry, DeleteOptions, HealthStatus, ListQuery, ListResult, PutOptions, Scope,
    StoreError, StoredItem,
};
use libsql::{params_from_iter, Connection, Transaction, Value};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::storage::adapter::StorageAdapter;

/// A handle that can run a parameterized `?`-placeholder query and return
/// rows, implemented identically for a bare connection and a transaction so
/// the read/check/write logic below doesn't care which one it's given.
#[async_trait]
trait RowSource: Send + Sync {
    async fn query_rows(&self, sql: &str, params: Vec<Value>) -> Result<libsql::Rows, libsql::Error>;
    async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<u64, libsql::Error>;
}

#[async_trait]
impl RowSource for Connection {
    async fn query_rows(&self, sql: &str, params: Vec<Value>) -> Result<libsql::Rows, libsql::Error> {
        self.query(sql, params_from_iter(params)).await
    }

    async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<u64, libsql::Error> {
        self.execute(sql, params_from_iter(params)).await
    }
}

#[async_trait]
impl RowSource for Transaction {
    async fn query_rows(&self, sql: &str, params: Vec<Value>) -> Result<libsql::Rows, libsql::Error> {
        self.query(sql, params_from_iter(params)).await
    }

    async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<u64, libsql::Error> {
        self.execute(sql, params_from_iter(params)).await
    }
}

/// `StorageAdapter` implementation shared by the embedded and remote `libsql`
/// backends.
///
/// `libsql::Connection` statement execution is not safe to call
/// concurrently from multiple tasks, so access is serialized behind a
/// `tokio::sync::Mutex`; the optimistic-concurrency check is additionally
/// wrapped in a transaction so the read-check-write sequence is atomic with
/// respect to any other connection to the same database.
pub struct LibsqlAdapter {
    conn: Mutex<Connection>,
    backend_name: &'static str,
}

impl LibsqlAdapter {
    /// Wraps an already-connected `libsql::Connection`, running schema setup.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema migration fails.
    pub async fn new(conn: Connection, backend_name: &'static str) -> anyhow::Result<Self> {
        let adapter = Self {
            conn: Mutex::new(conn),
            backend_name,
        };
        adapter.run_migrations().await?;
        Ok(adapter)
    }

    async fn run_migrations(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                tenant_id  TEXT NOT NULL,
                namespace  TEXT NOT NULL,
                user_id    TEXT NOT NULL,
                key        TEXT NOT NULL,
                value_json TEXT NOT NULL,
                version    INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                expires_at TEXT,
                PRIMARY KEY (tenant_id, namespace, user_id, key)
            );
            CREATE INDEX IF NOT EXISTS idx_items_expiry ON items(expires_at);",
        )
        .await?;
        Ok(())
    }
}

fn now_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::internal_from(format!("malformed {field} timestamp"), e))
}

struct Row {
    value_json: String,
    version: i64,
    created_at: String,
    updated_at: String,
    expires_at: Option<String>,
}

fn row_into_item(key: &str, row: Row) -> Result<StoredItem, StoreError> {
    let value = serde_json::from_str(&row.value_json)
        .map_err(|e| StoreError::internal_from("stored value is not valid JSON", e))?;
    let expires_at = row
        .expires_at
        .as_deref()
        .map(|s| parse_timestamp("expires_at", s))
        .transpose()?;
    Ok(StoredItem {
        key: key.to_string(),
        value,
        version: row.version,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        expires_at,
    })
}

async fn select_row(
    source: &impl RowSource,
    scope: &Scope,
    key: &str,
) -> Result<Option<Row>, StoreError> {
    let mut rows = source
        .query_rows(
            "SELECT value_json, version, created_at, updated_at, expires_at
             FROM items WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?",
            vec![
                scope.tenant_id.clone().into(),
                scope.namespace.clone().into(),
                scope.user_id.clone().into(),
                key.to_string().into(),
            ],
        )
        .await
        .map_err(|e| StoreError::internal_from("failed to query item", e))?;

    let Some(row) = rows
        .next()
        .await
        .map_err(|e| StoreError::internal_from("failed to read item row", e))?
    else {
        return Ok(None);
    };

    Ok(Some(Row {
        value_json: row
            .get(0)
            .map_err(|e| StoreError::internal_from("malformed value_json column", e))?,
        version: row
            .get(1)
            .map_err(|e| StoreError::internal_from("malformed version column", e))?,
        created_at: row
            .get(2)
            .map_err(|e| StoreError::internal_from("malformed created_at column", e))?,
        updated_at: row
            .get(3)
            .map_err(|e| StoreError::internal_from("malformed updated_at column", e))?,
        expires_at: row
            .get(4)
            .map_err(|e| StoreError::internal_from("malformed expires_at column", e))?,
    }))
}

/// The active item at `(scope, key)`, treating an expired row as absent.
async fn active_item(
    source: &impl RowSource,
    scope: &Scope,
    key: &str,
) -> Result<Option<StoredItem>, StoreError> {
    let Some(row) = select_row(source, scope, key).await? else {
        return Ok(None);
    };
    let item = row_into_item(key, row)?;
    if item.is_active_at(Utc::now()) {
        Ok(Some(item))
    } else {
        Ok(None)
    }
}

async fn get_impl(
    conn: &Connection,
    scope: &Scope,
    key: &str,
) -> Result<Option<StoredItem>, StoreError> {
    active_item(conn, scope, key).await
}

async fn put_impl(
    conn: &Connection,
    scope: &Scope,
    key: &str,
    value: serde_json::Value,
    options: PutOptions,
) -> Result<StoredItem, StoreError> {
    let tx = conn
        .transaction()
        .await
        .map_err(|e| StoreError::internal_from("failed to start transaction", e))?;

    let current = active_item(&tx, scope, key).await?;

    if let Some(expected) = options.if_match_version {
        match &current {
            Some(item) if item.version == expected => {}
            Some(item) => {
                return Err(StoreError::precondition_failed(format!(
                    "expected version {expected}, found {}",
                    item.version
                )));
            }
            None => {
                return Err(StoreError::precondition_failed(format!(
                    "expected version {expected}, item does not exist"
                )));
            }
        }
    }

    let now = Utc::now();
    let version = current.as_ref().map_or(1, |i| i.version + 1);
    let created_at = current.as_ref().map_or(now, |i| i.created_at);
    let expires_at = options
        .ttl_seconds
        .map(|s| now + chrono::Duration::seconds(s));

    let value_json = serde_json::to_string(&value)
        .map_err(|e| StoreError::internal_from("failed to serialize value", e))?;

    tx.exec(
        "INSERT OR REPLACE INTO items
         (tenant_id, namespace, user_id, key, value_json, version, created_at, updated_at, expires_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        vec![
            scope.tenant_id.clone().into(),
            scope.namespace.clone().into(),
            scope.user_id.clone().into(),
            key.to_string().into(),
            value_json.into(),
            version.into(),
            created_at.to_rfc3339_opts(SecondsFormat::Nanos, true).into(),
            now_str().into(),
            expires_at
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Nanos, true))
                .map_or(Value::Null, Value::from),
        ],
    )
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

async fn delete_impl(
    conn: &Connection,
    scope: &Scope,
    key: &str,
    options: DeleteOptions,
) -> Result<bool, StoreError> {
    let tx = conn
        .transaction()
        .await
        .map_err(|e| StoreError::internal_from("failed to start transaction", e))?;

    let Some(current) = active_item(&tx, scope, key).await? else {
        return Ok(false);
    };

    if let Some(expected) = options.if_match_version {
        if current.version != expected {
            return Err(StoreError::precondition_failed(format!(
                "expected version {expected}, found {}",
                current.version
            )));
        }
    }

    tx.exec(
        "DELETE FROM items WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?",
        vec![
            scope.tenant_id.clone().into(),
            scope.namespace.clone().into(),
            scope.user_id.clone().into(),
            key.to_string().into(),
        ],
    )
    .await
    .map_err(|e| StoreError::internal_from("failed to delete item", e))?;

    tx.commit()
        .await
        .map_err(|e| StoreError::internal_from("failed to commit delete", e))?;

    Ok(true)
}

async fn list_impl(
    conn: &Connection,
    scope: &Scope,
    query: ListQuery,
) -> Result<ListResult, StoreError> {
    let cursor_key = query
        .cursor
        .as_deref()
        .map(kvstore_core::util::decode_cursor)
        .transpose()?;

    let mut sql = String::from(
        "SELECT key, value_json, version, created_at, updated_at, expires_at FROM items
         WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND (expires_at IS NULL OR expires_at > ?)",
    );
    let mut values: Vec<Value> = vec![
        scope.tenant_id.clone().into(),
        scope.namespace.clone().into(),
        scope.user_id.clone().into(),
        now_str().into(),
    ];

    if let Some(prefix) = &query.prefix {
        sql.push_str(" AND key LIKE ? ESCAPE '\\'");
        values.push(escape_like_prefix(prefix).into());
    }
    if let Some(cursor_key) = &cursor_key {
        sql.push_str(" AND key > ?");
        values.push(cursor_key.clone().into());
    }
    sql.push_str(" ORDER BY key ASC LIMIT ?");
    let fetch_limit = i64::try_from(query.limit + 1).unwrap_or(i64::MAX);
    values.push(fetch_limit.into());

    let mut rows = conn
        .query_rows(&sql, values)
        .await
        .map_err(|e| StoreError::internal_from("failed to list items", e))?;

    let mut items = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| StoreError::internal_from("failed to read list row", e))?
    {
        let key: String = row
            .get(0)
            .map_err(|e| StoreError::internal_from("malformed key column", e))?;
        let parsed = row_into_item(
            &key,
            Row {
                value_json: row
                    .get(1)
                    .map_err(|e| StoreError::internal_from("malformed value_json column", e))?,
                version: row
                    .get(2)
                    .map_err(|e| StoreError::internal_from("malformed version column", e))?,
                created_at: row
                    .get(3)
                    .map_err(|e| StoreError::internal_from("malformed created_at column", e))?,
                updated_at: row
                    .get(4)
                    .map_err(|e| StoreError::internal_from("malformed updated_at column", e))?,
                expires_at: row
                    .get(5)
                    .map_err(|e| StoreError::internal_from("malformed expires_at column", e))?,
            },
        )?;
        items.push(parsed);
    }

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

/// Escapes `%`, `_`, and `\` in a literal prefix for use with `LIKE ... ESCAPE '\'`.
fn escape_like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 2);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl StorageAdapter for LibsqlAdapter {
    #[instrument(skip(self, key), fields(backend = self.backend_name))]
    async fn get(&self, scope: &Scope, key: &str) -> Result<Option<StoredItem>, StoreError> {
        let conn = self.conn.lock().await;
        get_impl(&conn, scope, key).await
    }

    #[instrument(skip(self, key, value), fields(backend = self.backend_name))]
    async fn put(
        &self,
        scope: &Scope,
        key: &str,
        value: serde_json::Value,
        options: PutOptions,
    ) -> Result<StoredItem, StoreError> {
        let conn = self.conn.lock().await;
        put_impl(&conn, scope, key, value, options).await
    }

    #[instrument(skip(self, key), fields(backend = self.backend_name))]
    async fn delete(
        &self,
        scope: &Scope,
        key: &str,
        options: DeleteOptions,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        delete_impl(&conn, scope, key, options).await
    }

    async fn batch_get(
        &self,
        scope: &Scope,
        keys: &[String],
    ) -> Result<HashMap<String, Option<StoredItem>>, StoreError> {
        let conn = self.conn.lock().await;
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            let item = get_impl(&conn, scope, key).await?;
            out.insert(key.clone(), item);
        }
        Ok(out)
    }

    async fn batch_put(
        &self,
        scope: &Scope,
        entries: Vec<BatchPutEntry>,
    ) -> Result<HashMap<String, StoredItem>, StoreError> {
        let conn = self.conn.lock().await;
        let mut out = HashMap::with_capacity(entries.len());
        for entry in entries {
            let item = put_impl(&conn, scope, &entry.key, entry.value, entry.options).await?;
            out.insert(entry.key, item);
        }
        Ok(out)
    }

    #[instrument(skip(self, query), fields(backend = self.backend_name))]
    async fn list(&self, scope: &Scope, query: ListQuery) -> Result<ListResult, StoreError> {
        let conn = self.conn.lock().await;
        list_impl(&conn, scope, query).await
    }

    async fn health(&self) -> HealthStatus {
        let conn = self.conn.lock().await;
        match conn.query("SELECT 1", ()).await {
            Ok(_) => HealthStatus::healthy(),
            Err(e) => {
                warn!(backend = self.backend_name, error = %e, "health check failed");
                HealthStatus::unhealthy(e.to_string())
            }
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        debug!(backend = self.backend_name, "closing libsql adapter");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvstore_core::ListQuery as Query;

    async fn memory_adapter() -> LibsqlAdapter {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .expect("open in-memory libsql db");
        let conn = db.connect().expect("connect in-memory libsql db");
        LibsqlAdapter::new(conn, "test")
            .await
            .expect("run migrations")
    }

    fn scope() -> Scope {
        Scope::new("tenant-a", "prefs", "user-1").unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips_value() {
        let adapter = memory_adapter().await;
        let scope = scope();
        let item = adapter
            .put(&scope, "theme", serde_json::json!("dark"), PutOptions::default())
            .await
            .expect("put");
        assert_eq!(item.version, 1);

        let fetched = adapter.get(&scope, "theme").await.expect("get").expect("present");
        assert_eq!(fetched.value, serde_json::json!("dark"));
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn put_increments_version_on_update() {
        let adapter = memory_adapter().await;
        let scope = scope();
        adapter
            .put(&scope, "k", serde_json::json!(1), PutOptions::default())
            .await
            .unwrap();
        let second = adapter
            .put(&scope, "k", serde_json::json!(2), PutOptions::default())
            .await
            .unwrap();
        assert_eq!(second.version, 2);
    }

    #[tokio::test]
    async fn put_with_mismatched_if_match_is_rejected() {
        let adapter = memory_adapter().await;
        let scope = scope();
        adapter
            .put(&scope, "k", serde_json::json!(1), PutOptions::default())
            .await
            .unwrap();

        let result = adapter
            .put(
                &scope,
                "k",
                serde_json::json!(2),
                PutOptions {
                    ttl_seconds: None,
                    if_match_version: Some(99),
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed { .. })));
    }

    #[tokio::test]
    async fn delete_missing_key_returns_false() {
        let adapter = memory_adapter().await;
        let removed = adapter
            .delete(&scope(), "missing", DeleteOptions::default())
            .await
            .unwrap();
        assert!(!removed);
    }

    #[tokio::test]
    async fn delete_existing_key_returns_true_and_removes_it() {
        let adapter = memory_adapter().await;
        let scope = scope();
        adapter
            .put(&scope, "k", serde_json::json!(1), PutOptions::default())
            .await
            .unwrap();
        let removed = adapter
            .delete(&scope, "k", DeleteOptions::default())
            .await
            .unwrap();
        assert!(removed);
        assert!(adapter.get(&scope, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_item_reads_as_absent() {
        let adapter = memory_adapter().await;
        let scope = scope();
        adapter
            .put(
                &scope,
                "k",
                serde_json::json!(1),
                PutOptions {
                    ttl_seconds: Some(-1),
                    if_match_version: None,
                },
            )
            .await
            .unwrap();
        assert!(adapter.get(&scope, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_returns_active_items_in_ascending_key_order() {
        let adapter = memory_adapter().await;
        let scope = scope();
        for key in ["b", "a", "c"] {
            adapter
                .put(&scope, key, serde_json::json!(key), PutOptions::default())
                .await
                .unwrap();
        }

        let result = adapter
            .list(
                &scope,
                Query {
                    prefix: None,
                    cursor: None,
                    limit: 10,
                },
            )
            .await
            .unwrap();

        let keys: Vec<_> = result.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(result.next_cursor.is_none());
    }

    #[tokio::test]
    async fn list_paginates_with_cursor() {
        let adapter = memory_adapter().await;
        let scope = scope();
        for key in ["a", "b", "c"] {
            adapter
                .put(&scope, key, serde_json::json!(key), PutOptions::default())
                .await
                .unwrap();
        }

        let first_page = adapter
            .list(
                &scope,
                Query {
                    prefix: None,
                    cursor: None,
                    limit: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(first_page.items.len(), 2);
        let cursor = first_page.next_cursor.expect("more pages");

        let second_page = adapter
            .list(
                &scope,
                Query {
                    prefix: None,
                    cursor: Some(cursor),
                    limit: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(second_page.items.len(), 1);
        assert_eq!(second_page.items[0].key, "c");
        assert!(second_page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let adapter = memory_adapter().await;
        let scope_a = Scope::new("tenant-a", "ns", "user-1").unwrap();
        let scope_b = Scope::new("tenant-b", "ns", "user-1").unwrap();

        adapter
            .put(&scope_a, "k", serde_json::json!("a"), PutOptions::default())
            .await
            .unwrap();

        assert!(adapter.get(&scope_b, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let adapter = memory_adapter().await;
        assert!(adapter.health().await.ok);
    }

    #[tokio::test]
    async fn batch_get_returns_entry_per_key_including_missing() {
        let adapter = memory_adapter().await;
        let scope = scope();
        adapter
            .put(&scope, "a", serde_json::json!(1), PutOptions::default())
            .await
            .unwrap();

        let result = adapter
            .batch_get(&scope, &["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert!(result["a"].is_some());
        assert!(result["missing"].is_none());
    }
}
