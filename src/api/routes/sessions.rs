//! Recording session endpoints

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{SessionResponse, SessionsResponse, StartSessionRequest},
};

/// POST /api/v1/sessions/start
///
/// Starts recording; without a project id in the body the active project is
/// recorded
pub async fn start_session(
    State(state): State<ApiState>,
    body: Option<Json<StartSessionRequest>>,
) -> ApiResult<Json<SessionResponse>> {
    let Json(request) = body.unwrap_or_default();

    let project_id = match request.project_id {
        Some(id) => id,
        None => state
            .ingest
            .get_stats()
            .await
            .and_then(|stats| stats.project_id)
            .ok_or_else(|| {
                ApiError::InvalidRequest("no project_id given and no project is active".to_string())
            })?,
    };
    let project_name = request.project_name.unwrap_or_else(|| project_id.clone());

    let session = state
        .ingest
        .start_recording(&project_id, &project_name)
        .await?;

    Ok(Json(SessionResponse {
        session: Some(session),
    }))
}

/// POST /api/v1/sessions/stop
pub async fn stop_session(State(state): State<ApiState>) -> ApiResult<Json<SessionResponse>> {
    let session = state.ingest.stop_recording().await?;
    Ok(Json(SessionResponse { session }))
}

/// GET /api/v1/projects/:id/sessions
pub async fn list_sessions(
    State(state): State<ApiState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<SessionsResponse>> {
    let sessions = state.storage.list_sessions(&project_id).await?;
    Ok(Json(SessionsResponse {
        project_id,
        count: sessions.len(),
        sessions,
    }))
}
