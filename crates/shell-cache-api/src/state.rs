//! Application state

use metrics_exporter_prometheus::PrometheusHandle;
use shell_cache_core::CacheWorker;
use std::sync::Arc;

/// Prometheus render handle
pub type MetricsHandle = PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<CacheWorker>,
}

impl AppState {
    pub fn new(worker: Arc<CacheWorker>) -> Self {
        Self { worker }
    }
}
