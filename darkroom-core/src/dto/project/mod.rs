//! Project DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::image::ImageRef;
use crate::domain::operation::OperationType;
use crate::domain::project::Project;

/// Request to create a project from an uploaded image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub original_image: ImageRef,
    #[serde(default)]
    pub max_versions: Option<usize>,
}

/// Request to append an already produced edit to a project's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendOperation {
    pub operation_type: OperationType,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub input_image: Option<ImageRef>,
    pub output_image: ImageRef,
}

/// Request to revert a project to a timeline index (-1 = original)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RevertProject {
    pub index: i64,
}

/// Lightweight project summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: Uuid,
    pub name: String,
    pub current_image: ImageRef,
    pub operation_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Project> for ProjectSummary {
    fn from(project: Project) -> Self {
        Self {
            id: project.id,
            name: project.name,
            current_image: project.current_image,
            operation_count: project.operations.len(),
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}
