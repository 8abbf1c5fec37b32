//! The four concrete `StorageAdapter` implementations.
//!
//! - [`sqlite_embedded`]: embedded SQLite via `libsql::Builder::new_local`.
//! - [`turso_remote`]: remote SQL-over-HTTP via `libsql::Builder::new_remote`.
//! - [`postgres`]: networked relational SQL via `sqlx`.
//! - [`redis_kv`]: key-value store without native transactions, via `redis`
//!   `WATCH`/`MULTI`/`EXEC`.

pub mod libsql_common;
pub mod postgres;
pub mod redis_kv;
pub mod sqlite_embedded;
pub mod turso_remote;

pub use libsql_common::LibsqlAdapter;
pub use postgres::PostgresAdapter;
pub use redis_kv::RedisAdapter;
