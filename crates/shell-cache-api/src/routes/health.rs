//! Health check endpoints

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::INTERNAL_PREFIX;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct PartitionStatus {
    pub name: String,
    pub entries: usize,
}

/// Health status response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub worker: String,
    pub partitions: Vec<PartitionStatus>,
}

/// Health check handler
async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    metrics::counter!("shell_cache_health_checks_total").increment(1);

    let partitions = state
        .worker
        .partitions()
        .await?
        .into_iter()
        .map(|(name, entries)| PartitionStatus { name, entries })
        .collect();

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        worker: state.worker.state().to_string(),
        partitions,
    }))
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(&format!("{}/health", INTERNAL_PREFIX), get(health))
        .route(&format!("{}/healthz", INTERNAL_PREFIX), get(health))
}
