//! Project-related API endpoints

use crate::DarkroomClient;
use crate::error::Result;
use darkroom_core::domain::project::{Project, TimelineEntry};
use darkroom_core::dto::project::{AppendOperation, CreateProject, ProjectSummary, RevertProject};
use uuid::Uuid;

impl DarkroomClient {
    // =============================================================================
    // Project Management
    // =============================================================================

    /// Create a project around an uploaded image
    ///
    /// # Example
    /// ```no_run
    /// # use darkroom_client::DarkroomClient;
    /// # use darkroom_core::domain::image::ImageRef;
    /// # use darkroom_core::dto::project::CreateProject;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = DarkroomClient::new("http://localhost:8080");
    /// let project = client.create_project(CreateProject {
    ///     name: "portrait".to_string(),
    ///     original_image: ImageRef::new("uploads/portrait", "http://localhost:8080/images/uploads/portrait.png"),
    ///     max_versions: None,
    /// }).await?;
    /// println!("Created project: {}", project.id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_project(&self, req: CreateProject) -> Result<Project> {
        let url = format!("{}/project", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// List all projects, most recently updated first
    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let url = format!("{}/project/list", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get a project, history included
    pub async fn get_project(&self, project_id: Uuid) -> Result<Project> {
        let url = format!("{}/project/{}", self.base_url, project_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn delete_project(&self, project_id: Uuid) -> Result<()> {
        let url = format!("{}/project/{}", self.base_url, project_id);
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // History
    // =============================================================================

    /// Append an edit produced elsewhere to the project's history
    pub async fn append_operation(&self, project_id: Uuid, req: AppendOperation) -> Result<Project> {
        let url = format!("{}/project/{}/operations", self.base_url, project_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Drop the most recent operation
    pub async fn undo(&self, project_id: Uuid) -> Result<Project> {
        let url = format!("{}/project/{}/undo", self.base_url, project_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Revert to a timeline index; -1 restores the original image
    pub async fn revert(&self, project_id: Uuid, index: i64) -> Result<Project> {
        let url = format!("{}/project/{}/revert", self.base_url, project_id);
        let response = self
            .client
            .post(&url)
            .json(&RevertProject { index })
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn timeline(&self, project_id: Uuid) -> Result<Vec<TimelineEntry>> {
        let url = format!("{}/project/{}/timeline", self.base_url, project_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
