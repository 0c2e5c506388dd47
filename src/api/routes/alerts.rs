//! Alert endpoints

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::alerts::AlertStats;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{AlertsResponse, ClearedResponse},
};

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    equipment_id: Option<String>,
    /// History only; 0 or absent means all
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    /// Default: 24
    older_than_hours: Option<i64>,
}

/// GET /api/v1/alerts/active
pub async fn active_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertQuery>,
) -> Json<AlertsResponse> {
    Json(
        state
            .alerts
            .active_alerts(query.equipment_id.as_deref())
            .into(),
    )
}

/// GET /api/v1/alerts/history
pub async fn alert_history(
    State(state): State<ApiState>,
    Query(query): Query<AlertQuery>,
) -> Json<AlertsResponse> {
    Json(
        state
            .alerts
            .history(query.limit.unwrap_or(0), query.equipment_id.as_deref())
            .into(),
    )
}

/// DELETE /api/v1/alerts/resolved
pub async fn clear_resolved(
    State(state): State<ApiState>,
    Query(query): Query<ClearQuery>,
) -> ApiResult<Json<ClearedResponse>> {
    let hours = query.older_than_hours.unwrap_or(24);
    if hours < 0 {
        return Err(ApiError::InvalidRequest(
            "older_than_hours must not be negative".to_string(),
        ));
    }
    let older_than = chrono::TimeDelta::try_hours(hours).ok_or_else(|| {
        ApiError::InvalidRequest(format!("older_than_hours out of range: {hours}"))
    })?;

    let removed = state.alerts.clear_resolved_older_than(older_than);
    Ok(Json(ClearedResponse { removed }))
}

/// GET /api/v1/alerts/stats
pub async fn alert_stats(State(state): State<ApiState>) -> Json<AlertStats> {
    Json(state.alerts.stats())
}
