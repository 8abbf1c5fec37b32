//! CLI entry point: parses configuration, builds the storage adapter, and
//! serves the HTTP edge until `SIGINT`/`SIGTERM`.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kvstore_server::config::AppConfig;
use kvstore_server::http::HttpServer;
use kvstore_server::identity::HeaderIdentityResolver;
use kvstore_server::service::{ServiceLimits, StorageService};
use kvstore_server::storage::factory::build_adapter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kvstore_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::parse();
    config.log_summary();

    let adapter = build_adapter(&config)
        .await
        .context("failed to initialize storage backend")?;
    let limits = ServiceLimits::from(&config);
    let service = Arc::new(StorageService::new(adapter, limits));
    let identity = Arc::new(HeaderIdentityResolver::new(&config));

    let mut server = HttpServer::new(config, service, identity);
    server.start().await.context("failed to bind HTTP listener")?;
    server.serve(shutdown_signal()).await?;

    Ok(())
}

/// Resolves once `SIGINT` (Ctrl-C) or, on Unix, `SIGTERM` is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
