//! Broker discovery endpoints

use axum::{Json, extract::State};

use crate::actors::discovery::DiscoveryStatus;
use crate::api::{error::ApiResult, state::ApiState, types::ClearedResponse};
use crate::config::MqttConfig;
use crate::graph::GraphLayout;

/// POST /api/v1/discovery/start
///
/// Replaces a running discovery and its results
pub async fn start_discovery(
    State(state): State<ApiState>,
    Json(config): Json<MqttConfig>,
) -> ApiResult<Json<DiscoveryStatus>> {
    state.discovery.start(config).await?;
    Ok(Json(state.discovery.status().await?))
}

/// POST /api/v1/discovery/stop
pub async fn stop_discovery(State(state): State<ApiState>) -> ApiResult<Json<DiscoveryStatus>> {
    state.discovery.stop().await?;
    Ok(Json(state.discovery.status().await?))
}

/// GET /api/v1/discovery
pub async fn discovery_status(State(state): State<ApiState>) -> ApiResult<Json<DiscoveryStatus>> {
    Ok(Json(state.discovery.status().await?))
}

/// DELETE /api/v1/discovery/nodes
pub async fn clear_discovered(State(state): State<ApiState>) -> ApiResult<Json<ClearedResponse>> {
    let removed = state.discovery.clear().await?;
    Ok(Json(ClearedResponse { removed }))
}

/// GET /api/v1/discovery/layout
///
/// One layout node per discovered equipment, ready to be edited into a
/// project declaration
pub async fn suggested_layout(State(state): State<ApiState>) -> Json<GraphLayout> {
    Json(state.discovery.inventory().suggested_layout())
}
