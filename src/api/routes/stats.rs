//! Pipeline statistics endpoint

use axum::{Json, extract::State};
use chrono::Utc;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::StatsResponse,
};

/// GET /api/v1/stats
///
/// Returns ingest, storage and alert counters
pub async fn get_stats(State(state): State<ApiState>) -> ApiResult<Json<StatsResponse>> {
    let ingest = state
        .ingest
        .get_stats()
        .await
        .ok_or_else(|| ApiError::Internal("ingest actor is not running".to_string()))?;
    let storage = state.storage.get_stats().await.unwrap_or_default();

    let now = Utc::now();
    Ok(Json(StatsResponse {
        timestamp: now.to_rfc3339(),
        uptime_secs: (now - state.started_at).num_seconds(),
        ingest,
        storage,
        alerts: state.alerts.stats(),
        graph_nodes: state.aggregator.node_count(),
        websocket_clients: state.dispatcher.subscriber_count(),
        events_published: state.dispatcher.published(),
    }))
}
