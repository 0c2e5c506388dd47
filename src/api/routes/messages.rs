//! Recorded message endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT, MessagesResponse},
};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Max results (default: 100)
    limit: Option<usize>,
}

impl MessageQuery {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT)
    }
}

/// GET /api/v1/projects/:id/messages
///
/// The latest recorded messages of a project, oldest first
pub async fn project_messages(
    State(state): State<ApiState>,
    Path(project_id): Path<String>,
    Query(query): Query<MessageQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    let messages = state
        .storage
        .query_project_messages(&project_id, query.limit())
        .await?;

    Ok(Json(MessagesResponse {
        project_id,
        equipment_id: None,
        count: messages.len(),
        messages,
    }))
}

/// GET /api/v1/projects/:id/equipment/:equipment_id/messages
pub async fn equipment_messages(
    State(state): State<ApiState>,
    Path((project_id, equipment_id)): Path<(String, String)>,
    Query(query): Query<MessageQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    let messages = state
        .storage
        .query_equipment_messages(&project_id, &equipment_id, query.limit())
        .await?;

    Ok(Json(MessagesResponse {
        project_id,
        equipment_id: Some(equipment_id),
        count: messages.len(),
        messages,
    }))
}
