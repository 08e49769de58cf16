//! Edit Service
//!
//! Runs pipelines against a project's current image and records each
//! successful run as one history entry. Free-text prompts are routed
//! through the classifier to exactly one typed intent first.

use darkroom_core::domain::intent::{Intent, IntentError, SUPPORTED_FEATURES};
use darkroom_core::dto::edit::{EditResponse, PromptResponse, QualityReport};
use darkroom_engine::classifier::{ClassifierAdapter, ClassifierError};
use darkroom_engine::{EditEngine, PipelineError};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::service::project::{ProjectError, ProjectService};

/// Service error type
#[derive(Debug)]
pub enum EditError {
    Project(ProjectError),
    Pipeline(PipelineError),
    InvalidParameters(String),
    QuotaExceeded(String),
    ClassifierUnavailable(String),
}

impl From<ProjectError> for EditError {
    fn from(err: ProjectError) -> Self {
        EditError::Project(err)
    }
}

impl From<PipelineError> for EditError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidParameters(msg) => EditError::InvalidParameters(msg),
            other => EditError::Pipeline(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EditError>;

/// Pipeline runs, prompt routing and quality analysis for projects
pub struct EditService {
    projects: Arc<ProjectService>,
    engine: Arc<dyn EditEngine>,
    classifier: Arc<dyn ClassifierAdapter>,
    classifier_timeout: Duration,
}

impl EditService {
    pub fn new(
        projects: Arc<ProjectService>,
        engine: Arc<dyn EditEngine>,
        classifier: Arc<dyn ClassifierAdapter>,
        classifier_timeout: Duration,
    ) -> Self {
        Self {
            projects,
            engine,
            classifier,
            classifier_timeout,
        }
    }

    /// Run one typed edit on the project's current image
    pub async fn apply(&self, id: Uuid, intent: Intent) -> Result<EditResponse> {
        let project = self.projects.get_project(id).await?;

        tracing::info!(
            "Applying {} to project {} (current image {})",
            intent.operation_type(),
            id,
            project.current_image.id
        );

        let result = self.engine.run(&project.current_image, &intent).await?;
        let project = self.projects.record_edit(id, &result).await?;

        Ok(EditResponse { project, result })
    }

    /// Route a free-text instruction to an edit and run it
    pub async fn prompt(&self, id: Uuid, prompt: &str) -> Result<PromptResponse> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EditError::InvalidParameters(
                "Prompt cannot be empty".to_string(),
            ));
        }

        let project = self.projects.get_project(id).await?;

        // The image only sharpens routing; it is not required
        let image = match self.engine.load_image(&project.current_image).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Routing prompt without image context: {}", e);
                None
            }
        };

        let route = tokio::time::timeout(
            self.classifier_timeout,
            self.classifier.route_intent(image.as_deref(), prompt),
        )
        .await
        .map_err(|_| ClassifierError::Timeout(self.classifier_timeout))
        .and_then(|routed| routed)
        .map_err(|e| match e {
            ClassifierError::QuotaExceeded(msg) => EditError::QuotaExceeded(msg),
            other => EditError::ClassifierUnavailable(other.to_string()),
        })?;

        tracing::info!(
            "Prompt for project {} routed to '{}' (supported: {})",
            id,
            route.feature,
            route.supported
        );

        if !route.supported {
            return Ok(unsupported(&route.feature, route.message));
        }

        let intent = match Intent::from_route(&route.feature, &route.parameters) {
            Ok(intent) => intent,
            Err(IntentError::Unsupported(feature)) => return Ok(unsupported(&feature, route.message)),
            Err(IntentError::InvalidParameters(msg)) => {
                return Err(EditError::InvalidParameters(msg));
            }
        };

        let EditResponse { project, result } = self.apply(id, intent).await?;
        Ok(PromptResponse::Applied { project, result })
    }

    /// Report which enhancements the project's current image needs
    ///
    /// Never fails because of the classifier: an unavailable analysis
    /// yields an empty, degraded report.
    pub async fn quality(&self, id: Uuid) -> Result<QualityReport> {
        let project = self.projects.get_project(id).await?;

        let bytes = match self.engine.load_image(&project.current_image).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Quality analysis skipped, image unavailable: {}", e);
                return Ok(degraded());
            }
        };

        match tokio::time::timeout(self.classifier_timeout, self.classifier.analyze_quality(&bytes))
            .await
        {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => {
                tracing::warn!("Quality analysis failed: {}", e);
                Ok(degraded())
            }
            Err(_) => {
                tracing::warn!(
                    "Quality analysis timed out after {:?}",
                    self.classifier_timeout
                );
                Ok(degraded())
            }
        }
    }
}

fn unsupported(feature: &str, message: Option<String>) -> PromptResponse {
    PromptResponse::Unsupported {
        feature: feature.to_string(),
        message: message.unwrap_or_else(|| {
            format!("'{}' is not available; try one of the supported features", feature)
        }),
        supported_features: SUPPORTED_FEATURES.iter().map(|f| f.to_string()).collect(),
    }
}

fn degraded() -> QualityReport {
    QualityReport {
        degraded: true,
        ..QualityReport::default()
    }
}
