//! Edit API Handlers
//!
//! HTTP endpoints that run pipelines against a project.

use axum::{
    Json,
    extract::{Path, State},
};
use darkroom_core::domain::intent::Intent;
use darkroom_core::dto::edit::{EditResponse, PromptRequest, PromptResponse, QualityReport};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /project/{id}/apply
/// Run a typed edit on the project's current image
pub async fn apply(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(intent): Json<Intent>,
) -> ApiResult<Json<EditResponse>> {
    tracing::info!("Applying {} to project {}", intent.operation_type(), id);

    let response = state.edits.apply(id, intent).await?;
    Ok(Json(response))
}

/// POST /project/{id}/prompt
/// Route a free-text instruction to an edit
pub async fn prompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PromptRequest>,
) -> ApiResult<Json<PromptResponse>> {
    tracing::info!("Routing prompt for project {}: {}", id, req.prompt);

    let response = state.edits.prompt(id, &req.prompt).await?;
    Ok(Json(response))
}

/// GET /project/{id}/quality
/// Enhancements the current image would benefit from
pub async fn quality(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QualityReport>> {
    tracing::debug!("Analyzing quality of project {}", id);

    let report = state.edits.quality(id).await?;
    Ok(Json(report))
}
