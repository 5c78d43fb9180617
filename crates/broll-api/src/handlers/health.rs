//! Health check handler.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use broll_queue::TaskStats;

use crate::error::ApiResult;
use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    /// Tasks waiting for a worker
    pub queue_length: usize,
    pub tasks: TaskStats,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let tasks = state.store.stats().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        queue_length: state.queue.len(),
        tasks,
    }))
}
