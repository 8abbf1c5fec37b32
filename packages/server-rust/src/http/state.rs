//! Shared application state passed to every axum handler via `State`.

use std::sync::Arc;
use std::time::Instant;

use crate::identity::IdentityResolver;
use crate::service::StorageService;

use super::shutdown::ShutdownController;

/// Shared state carried through axum extractors. Cloning is cheap: every
/// field is an `Arc` or `Copy`.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StorageService>,
    pub identity: Arc<dyn IdentityResolver>,
    pub shutdown: Arc<ShutdownController>,
    pub start_time: Instant,
}
