//! Multi-tenant JSON key-value store server: HTTP edge over one of four
//! interchangeable storage backends (embedded SQLite, remote `libsql`,
//! `PostgreSQL`, Redis).

pub mod config;
pub mod http;
pub mod identity;
pub mod service;
pub mod storage;

pub use config::AppConfig;
pub use http::HttpServer;
pub use identity::{HeaderIdentityResolver, IdentityResolver};
pub use service::StorageService;
pub use storage::StorageAdapter;
