//! Backend selection: constructs the configured [`StorageAdapter`] from
//! [`crate::config::AppConfig`].
//!
//! This is the dependency injection point between configuration and the
//! storage layer: the CLI entry point calls [`build_adapter`] once at
//! startup and shares the resulting `Arc<dyn StorageAdapter>` with the
//! storage service and every HTTP handler.

use std::sync::Arc;

use crate::config::{AppConfig, BackendKind};
use crate::storage::adapter::StorageAdapter;
use crate::storage::backends::{postgres::PostgresAdapter, redis_kv::RedisAdapter, sqlite_embedded, turso_remote};

/// Builds the `StorageAdapter` selected by `config.backend`.
///
/// # Errors
///
/// Returns an error if the selected backend cannot be reached (connection
/// failure, missing required configuration, or schema migration failure).
pub async fn build_adapter(config: &AppConfig) -> anyhow::Result<Arc<dyn StorageAdapter>> {
    match config.backend {
        BackendKind::Sqlite => {
            let adapter = sqlite_embedded::open(&config.sqlite_path).await?;
            Ok(Arc::new(adapter))
        }
        BackendKind::Turso => {
            let url = config
                .turso_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("KVSTORE_TURSO_URL is required for backend=turso"))?;
            let token = config
                .turso_token
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("KVSTORE_TURSO_TOKEN is required for backend=turso"))?;
            let adapter = turso_remote::connect(url, token).await?;
            Ok(Arc::new(adapter))
        }
        BackendKind::Postgres => {
            let url = config.postgres_url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("KVSTORE_POSTGRES_URL is required for backend=postgres")
            })?;
            let adapter = PostgresAdapter::connect(url).await?;
            Ok(Arc::new(adapter))
        }
        BackendKind::Redis => {
            let adapter = RedisAdapter::connect(&config.redis_url).await?;
            Ok(Arc::new(adapter))
        }
    }
}
