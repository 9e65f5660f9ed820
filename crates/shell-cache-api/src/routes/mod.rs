//! API routes

mod health;
mod intercept;
pub mod metrics;

use axum::{Router, extract::DefaultBodyLimit};
use std::sync::Arc;

use crate::state::{AppState, MetricsHandle};

/// Path prefix reserved for the host's own endpoints. Everything else is
/// offered to the worker.
pub const INTERNAL_PREFIX: &str = "/__shell-cache";

/// Largest request body forwarded upstream (pass-through uploads)
const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

/// Create the main router
pub fn create_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    let mut router = Router::new()
        .merge(health::routes())
        .fallback(intercept::intercept)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY));

    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    router
}
