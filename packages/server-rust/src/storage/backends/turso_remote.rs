//! Remote SQL-over-HTTP backend: a `libsql` database reached over Hrana
//! (e.g. a Turso-hosted database).
//!
//! Shares all query logic with the embedded backend via
//! [`super::libsql_common`]; only connection construction differs.

use tracing::info;

use super::libsql_common::LibsqlAdapter;

/// Connects to a remote `libsql`/Turso database over HTTP.
///
/// # Errors
///
/// Returns an error if the remote database cannot be reached or schema
/// migration fails.
pub async fn connect(url: &str, auth_token: &str) -> anyhow::Result<LibsqlAdapter> {
    let db = libsql::Builder::new_remote(url.to_string(), auth_token.to_string())
        .build()
        .await?;
    let conn = db.connect()?;
    info!(url, "connected to remote sql-over-http backend");
    LibsqlAdapter::new(conn, "turso_remote").await
}
