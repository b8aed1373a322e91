//! Liveness and health handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{AppError, AppState};

/// Response for GET /api/health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Text extraction backend name
    pub ocr_backend: String,
    pub ocr_healthy: bool,
    pub active_collections: usize,
    pub registered_users: usize,
    /// Groups collecting or flushing right now
    pub pending_groups: usize,
}

/// GET / - Plain liveness probe
pub async fn root() -> &'static str {
    "tally is running"
}

/// GET /api/health - Backend and queue status
///
/// Fails with 500 when the user directory cannot be read.
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let stores = state.service.stores();
    let registered_users = stores.users.list()?.len();
    Ok(Json(HealthResponse {
        status: "ok",
        ocr_backend: state.extractor.name().to_string(),
        ocr_healthy: state.extractor.health_check().await,
        active_collections: stores.registry.len(),
        registered_users,
        pending_groups: stores.aggregator.len(),
    }))
}
