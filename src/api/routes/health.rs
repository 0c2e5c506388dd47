//! Health check endpoint

use axum::{Json, extract::State};
use tracing::warn;

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /api/v1/health
///
/// Reports `degraded` when the storage backend is unhealthy or unreachable
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let storage = match state.storage.health_check().await {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("storage health check failed: {e:#}");
            None
        }
    };

    let healthy = storage.as_ref().is_some_and(|s| s.healthy);

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage: storage.map(Into::into),
    })
}
