//! Live graph and project endpoints

use axum::{Json, extract::State};
use tracing::info;

use crate::api::{error::ApiResult, state::ApiState, types::ProjectResponse};
use crate::config::ProjectDeclaration;
use crate::graph::GraphSnapshot;

/// GET /api/v1/graph
pub async fn get_graph(State(state): State<ApiState>) -> Json<GraphSnapshot> {
    Json(state.aggregator.snapshot())
}

/// PUT /api/v1/project
///
/// Validates the declaration, then resets the graph and replaces the
/// project's thresholds
pub async fn put_project(
    State(state): State<ApiState>,
    Json(declaration): Json<ProjectDeclaration>,
) -> ApiResult<Json<ProjectResponse>> {
    let project = declaration.validate()?;
    let response = ProjectResponse {
        id: project.id.clone(),
        name: project.name.clone(),
        thresholds: project.thresholds.len(),
        layout_nodes: project.graph_layout.nodes.len(),
    };

    info!("switching project to {} via API", project.id);
    state.ingest.set_project(project).await?;

    Ok(Json(response))
}
