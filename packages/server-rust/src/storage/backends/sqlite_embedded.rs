//! Embedded SQLite backend: a local `libsql` database file (or `:memory:`).
//!
//! This is the default backend for single-process and development
//! deployments. All query logic lives in [`super::libsql_common`].

use std::path::Path;

use tracing::info;

use super::libsql_common::LibsqlAdapter;

/// Opens (creating if absent) an embedded SQLite database at `path`.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created, the
/// database cannot be opened, or schema migration fails.
pub async fn open(path: &Path) -> anyhow::Result<LibsqlAdapter> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = libsql::Builder::new_local(path).build().await?;
    let conn = db.connect()?;
    info!(path = %path.display(), "opened embedded sqlite backend");
    LibsqlAdapter::new(conn, "sqlite_embedded").await
}

/// Opens an ephemeral in-memory database, used by tests and the storage
/// service's own unit tests.
///
/// # Errors
///
/// Returns an error if the in-memory database cannot be opened or schema
/// migration fails.
pub async fn open_in_memory() -> anyhow::Result<LibsqlAdapter> {
    let db = libsql::Builder::new_local(":memory:").build().await?;
    let conn = db.connect()?;
    LibsqlAdapter::new(conn, "sqlite_embedded").await
}
