//! Edit-related API endpoints

use crate::DarkroomClient;
use crate::error::Result;
use darkroom_core::domain::intent::Intent;
use darkroom_core::dto::edit::{EditResponse, PromptRequest, PromptResponse, QualityReport};
use uuid::Uuid;

impl DarkroomClient {
    /// Run a typed edit on the project's current image
    ///
    /// Pipelines run containers and can take minutes; configure the
    /// underlying HTTP client's timeout accordingly.
    pub async fn apply(&self, project_id: Uuid, intent: &Intent) -> Result<EditResponse> {
        let url = format!("{}/project/{}/apply", self.base_url, project_id);
        let response = self.client.post(&url).json(intent).send().await?;

        self.handle_response(response).await
    }

    /// Route a free-text instruction to an edit and run it
    pub async fn prompt(&self, project_id: Uuid, prompt: impl Into<String>) -> Result<PromptResponse> {
        let url = format!("{}/project/{}/prompt", self.base_url, project_id);
        let req = PromptRequest {
            prompt: prompt.into(),
        };
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Enhancements the project's current image would benefit from
    pub async fn quality(&self, project_id: Uuid) -> Result<QualityReport> {
        let url = format!("{}/project/{}/quality", self.base_url, project_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Check that the server is up
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
