//! API Module
//!
//! HTTP API layer of the server.
//! Each submodule handles endpoints for a specific domain.

pub mod edit;
pub mod error;
pub mod health;
pub mod project;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::edit::EditService;
use crate::service::project::ProjectService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<ProjectService>,
    pub edits: Arc<EditService>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Project endpoints
        .route("/project", post(project::create_project))
        .route("/project/list", get(project::list_projects))
        .route(
            "/project/{id}",
            get(project::get_project).delete(project::delete_project),
        )
        .route("/project/{id}/operations", post(project::append_operation))
        .route("/project/{id}/undo", post(project::undo))
        .route("/project/{id}/revert", post(project::revert))
        .route("/project/{id}/timeline", get(project::timeline))
        // Edit endpoints
        .route("/project/{id}/apply", post(edit::apply))
        .route("/project/{id}/prompt", post(edit::prompt))
        .route("/project/{id}/quality", get(edit::quality))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryProjectRepository;
    use crate::testing::{StubClassifier, StubEngine, image};
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use darkroom_engine::stage::StageError;
    use darkroom_engine::PipelineError;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(engine: Arc<StubEngine>) -> Router {
        let projects = Arc::new(ProjectService::new(
            Arc::new(MemoryProjectRepository::new()),
            20,
        ));
        let edits = Arc::new(EditService::new(
            projects.clone(),
            engine,
            Arc::new(StubClassifier::default()),
            Duration::from_millis(200),
        ));
        create_router(AppState { projects, edits })
    }

    fn app() -> Router {
        app_with(Arc::new(StubEngine::new()))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(app: &Router) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/project",
            Some(json!({ "name": "portrait", "original_image": image("original") })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_apply_undo_and_timeline() {
        let app = app();
        let id = create(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/project/{}/apply", id),
            Some(json!({ "kind": "relight", "brightness": 1.3, "direction": "top" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["pipeline"], "relight");
        assert_eq!(body["project"]["operations"].as_array().unwrap().len(), 1);

        let (status, timeline) =
            send(&app, Method::GET, &format!("/project/{}/timeline", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(timeline.as_array().unwrap().len(), 2);

        let (status, body) = send(&app, Method::POST, &format!("/project/{}/undo", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_image"], json!(image("original")));

        let (status, _) = send(&app, Method::POST, &format!("/project/{}/undo", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_revert_out_of_range_is_bad_request() {
        let app = app();
        let id = create(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/project/{}/revert", id),
            Some(json!({ "index": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid revert index"));
    }

    #[tokio::test]
    async fn test_stage_failure_reports_stage() {
        let engine = Arc::new(StubEngine::new());
        engine.fail_with(|| PipelineError::StageFailed {
            pipeline: "object-removal",
            stage: "dilate",
            cause: StageError::EmptyOutput,
        });
        let app = app_with(engine);
        let id = create(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/project/{}/apply", id),
            Some(json!({ "kind": "object-removal", "x": 10, "y": 20 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["stage"], "dilate");

        let (_, project) = send(&app, Method::GET, &format!("/project/{}", id), None).await;
        assert!(project["operations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_project_and_delete() {
        let app = app();
        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/project/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let id = create(&app).await;
        let (status, _) = send(&app, Method::DELETE, &format!("/project/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, list) = send(&app, Method::GET, "/project/list", None).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quality_degrades_without_classifier() {
        let app = app();
        let id = create(&app).await;

        let (status, body) =
            send(&app, Method::GET, &format!("/project/{}/quality", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["degraded"], true);
    }
}
