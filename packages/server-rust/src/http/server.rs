//! HTTP server with deferred startup lifecycle.
//!
//! Follows this repository's network module convention: `new()` allocates
//! shared state, `start()` binds the TCP listener, and `serve()` begins
//! accepting connections. The split lets the caller learn the bound port
//! (useful for `port = 0` in tests) before handing off to the accept loop.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::identity::IdentityResolver;
use crate::service::StorageService;

use super::handlers::{
    batch_get, batch_put, delete_item, get_item, healthz, list_items, put_item, readyz,
};
use super::middleware::{build_http_layers, track_in_flight};
use super::shutdown::ShutdownController;
use super::state::AppState;

/// Drain timeout for in-flight requests once shutdown is triggered.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- allocates the shutdown controller and shared state
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until the shutdown signal fires
pub struct HttpServer {
    config: AppConfig,
    service: Arc<StorageService>,
    identity: Arc<dyn IdentityResolver>,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl HttpServer {
    /// Creates a new HTTP server without binding any port.
    #[must_use]
    pub fn new(
        config: AppConfig,
        service: Arc<StorageService>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            config,
            service,
            identity,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn build_router(&self) -> Router {
        let state = AppState {
            service: Arc::clone(&self.service),
            identity: Arc::clone(&self.identity),
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        };

        let layers = build_http_layers(&self.config);

        Router::new()
            .route("/v1/healthz", get(healthz))
            .route("/v1/readyz", get(readyz))
            .route("/v1/items", get(list_items))
            .route("/v1/items/{key}", put(put_item).get(get_item).delete(delete_item))
            .route("/v1/items:batchGet", post(batch_get))
            .route("/v1/items:batchPut", post(batch_put))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                track_in_flight,
            ))
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to `Draining`
    /// 2. Waits up to 30 seconds for in-flight requests to complete
    /// 3. Health state transitions to `Stopped`
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let listener = self
            .listener
            .expect("start() must be called before serve()");
        let shutdown_ctrl = Arc::clone(&self.shutdown);
        let router = self.build_router();

        shutdown_ctrl.set_ready();

        info!("serving HTTP connections");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        shutdown_ctrl.trigger_shutdown();
        let drained = shutdown_ctrl.wait_for_drain(DRAIN_TIMEOUT).await;
        if drained {
            info!("all in-flight requests drained");
        } else {
            warn!("drain timeout expired with in-flight requests remaining");
        }

        Ok(())
    }
}
