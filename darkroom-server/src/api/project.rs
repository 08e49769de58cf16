//! Project API Handlers
//!
//! HTTP endpoints for projects and their edit history.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use darkroom_core::domain::project::{Project, TimelineEntry};
use darkroom_core::dto::project::{AppendOperation, CreateProject, ProjectSummary, RevertProject};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /project
/// Create a new project
pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProject>,
) -> ApiResult<Json<Project>> {
    tracing::info!("Creating project: {}", req.name);

    let project = state.projects.create_project(req).await?;
    Ok(Json(project))
}

/// GET /project/list
/// List all projects
pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<ProjectSummary>>> {
    tracing::debug!("Listing all projects");

    let projects = state.projects.list_projects().await?;
    Ok(Json(projects))
}

/// GET /project/{id}
/// Get project by ID, history included
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    tracing::debug!("Getting project: {}", id);

    let project = state.projects.get_project(id).await?;
    Ok(Json(project))
}

/// DELETE /project/{id}
/// Delete a project
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting project: {}", id);

    state.projects.delete_project(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /project/{id}/operations
/// Append an already produced edit
pub async fn append_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AppendOperation>,
) -> ApiResult<Json<Project>> {
    tracing::info!("Appending {} operation to project {}", req.operation_type, id);

    let project = state.projects.append_operation(id, req).await?;
    Ok(Json(project))
}

/// POST /project/{id}/undo
/// Undo the last operation
pub async fn undo(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Project>> {
    tracing::info!("Undoing last operation of project {}", id);

    let project = state.projects.undo(id).await?;
    Ok(Json(project))
}

/// POST /project/{id}/revert
/// Revert to a timeline index (-1 = original image)
pub async fn revert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RevertProject>,
) -> ApiResult<Json<Project>> {
    tracing::info!("Reverting project {} to index {}", id, req.index);

    let project = state.projects.revert(id, req.index).await?;
    Ok(Json(project))
}

/// GET /project/{id}/timeline
/// Original image followed by every retained operation
pub async fn timeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<TimelineEntry>>> {
    tracing::debug!("Getting timeline of project {}", id);

    let timeline = state.projects.timeline(id).await?;
    Ok(Json(timeline))
}
