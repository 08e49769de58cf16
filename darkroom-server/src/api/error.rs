//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use darkroom_core::domain::project::HistoryError;
use darkroom_engine::PipelineError;

use crate::service::edit::EditError;
use crate::service::project::ProjectError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    TooManyRequests(String),
    BadGateway {
        message: String,
        stage: Option<String>,
    },
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, stage) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg, None),
            ApiError::BadGateway { message, stage } => {
                tracing::warn!("Upstream failure: {}", message);
                (StatusCode::BAD_GATEWAY, message, stage)
            }
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
        };

        let body = match stage {
            Some(stage) => serde_json::json!({ "error": message, "stage": stage }),
            None => serde_json::json!({ "error": message }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<ProjectError> for ApiError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::NotFound(id) => ApiError::NotFound(format!("Project {} not found", id)),
            ProjectError::ValidationError(msg) => ApiError::BadRequest(msg),
            ProjectError::History(err @ HistoryError::NothingToUndo) => {
                ApiError::Conflict(err.to_string())
            }
            ProjectError::History(err @ HistoryError::InvalidRevertIndex { .. }) => {
                ApiError::BadRequest(err.to_string())
            }
            ProjectError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<EditError> for ApiError {
    fn from(err: EditError) -> Self {
        match err {
            EditError::Project(err) => err.into(),
            EditError::InvalidParameters(msg) => ApiError::BadRequest(msg),
            EditError::QuotaExceeded(msg) => {
                ApiError::TooManyRequests(format!("Classifier quota exceeded: {}", msg))
            }
            EditError::ClassifierUnavailable(msg) => ApiError::BadGateway {
                message: format!("Classifier unavailable: {}", msg),
                stage: None,
            },
            EditError::Pipeline(err) => pipeline_error(err),
        }
    }
}

fn pipeline_error(err: PipelineError) -> ApiError {
    match err {
        PipelineError::InvalidParameters(msg) => ApiError::BadRequest(msg),
        other => ApiError::BadGateway {
            stage: other.stage().map(str::to_string),
            message: other.to_string(),
        },
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
