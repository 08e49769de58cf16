//! Project Service
//!
//! Business logic for projects and their edit history. Every history
//! mutation runs load → mutate → save under a per-project lock, so two
//! requests against the same project never overwrite each other.

use darkroom_core::domain::image::ImageRef;
use darkroom_core::domain::project::{HistoryError, MAX_VERSIONS_LIMIT, Project, TimelineEntry};
use darkroom_core::dto::edit::EditResult;
use darkroom_core::dto::project::{AppendOperation, CreateProject, ProjectSummary};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::repository::ProjectRepository;

/// Service error type
#[derive(Debug)]
pub enum ProjectError {
    NotFound(Uuid),
    ValidationError(String),
    History(HistoryError),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for ProjectError {
    fn from(err: sqlx::Error) -> Self {
        ProjectError::DatabaseError(err)
    }
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::NotFound(id) => write!(f, "Project {} not found", id),
            ProjectError::ValidationError(msg) => write!(f, "{}", msg),
            ProjectError::History(err) => write!(f, "{}", err),
            ProjectError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectError>;

/// Projects and their history
pub struct ProjectService {
    repo: Arc<dyn ProjectRepository>,
    default_max_versions: usize,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProjectService {
    pub fn new(repo: Arc<dyn ProjectRepository>, default_max_versions: usize) -> Self {
        Self {
            repo,
            default_max_versions: default_max_versions.clamp(1, MAX_VERSIONS_LIMIT),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new project around an uploaded image
    pub async fn create_project(&self, req: CreateProject) -> Result<Project> {
        validate_create_request(&req)?;

        let max_versions = req.max_versions.unwrap_or(self.default_max_versions);
        let project = Project::new(req.name.trim(), req.original_image, max_versions);
        self.repo.create(&project).await?;

        tracing::info!(
            "Project created: {} ({}), keeping {} version(s)",
            project.name,
            project.id,
            project.max_versions
        );

        Ok(project)
    }

    /// Get a project by ID
    pub async fn get_project(&self, id: Uuid) -> Result<Project> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(ProjectError::NotFound(id))
    }

    /// List all projects
    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let projects = self.repo.list_all().await?;
        Ok(projects.into_iter().map(ProjectSummary::from).collect())
    }

    /// Delete a project
    pub async fn delete_project(&self, id: Uuid) -> Result<()> {
        let deleted = {
            let lock = self.lock_for(id);
            let _guard = lock.lock().await;
            self.repo.delete(id).await
        };
        self.forget_lock(id);

        if !deleted? {
            return Err(ProjectError::NotFound(id));
        }

        tracing::info!("Project deleted: {}", id);
        Ok(())
    }

    /// Append an edit produced outside the server's pipelines
    pub async fn append_operation(&self, id: Uuid, req: AppendOperation) -> Result<Project> {
        validate_image(&req.output_image, "output_image")?;

        self.mutate(id, move |project| {
            let op = project.add_operation(
                req.operation_type,
                req.parameters,
                req.input_image,
                req.output_image,
            );
            tracing::info!("Appended {} operation {} to project", op.operation_type, op.id);
            Ok(())
        })
        .await
    }

    /// Record a successful pipeline run as one history entry
    pub async fn record_edit(&self, id: Uuid, result: &EditResult) -> Result<Project> {
        let result = result.clone();
        self.mutate(id, move |project| {
            project.add_operation(
                result.operation_type,
                result.parameters,
                Some(result.input_image),
                result.output_image,
            );
            Ok(())
        })
        .await
    }

    /// Undo the last operation
    pub async fn undo(&self, id: Uuid) -> Result<Project> {
        self.mutate(id, |project| {
            let removed = project.undo_last_operation()?;
            tracing::info!("Undid {} operation {}", removed.operation_type, removed.id);
            Ok(())
        })
        .await
    }

    /// Revert to a timeline index (-1 = original image)
    pub async fn revert(&self, id: Uuid, index: i64) -> Result<Project> {
        self.mutate(id, move |project| {
            let removed = project.revert_to_operation(index)?;
            tracing::info!(
                "Reverted to index {}, dropping {} operation(s)",
                index,
                removed.len()
            );
            Ok(())
        })
        .await
    }

    /// Get the project's timeline
    pub async fn timeline(&self, id: Uuid) -> Result<Vec<TimelineEntry>> {
        Ok(self.get_project(id).await?.timeline())
    }

    async fn mutate<F>(&self, id: Uuid, apply: F) -> Result<Project>
    where
        F: FnOnce(&mut Project) -> std::result::Result<(), HistoryError> + Send,
    {
        let result = {
            let lock = self.lock_for(id);
            let _guard = lock.lock().await;
            self.mutate_locked(id, apply).await
        };

        if matches!(result, Err(ProjectError::NotFound(_))) {
            self.forget_lock(id);
        }
        result
    }

    async fn mutate_locked<F>(&self, id: Uuid, apply: F) -> Result<Project>
    where
        F: FnOnce(&mut Project) -> std::result::Result<(), HistoryError> + Send,
    {
        let mut project = self.get_project(id).await?;
        apply(&mut project).map_err(ProjectError::History)?;
        debug_assert!(project.is_consistent());

        if !self.repo.save(&project).await? {
            return Err(ProjectError::NotFound(id));
        }

        tracing::debug!(
            "Project {} now has {} operation(s), current image {}",
            id,
            project.operations.len(),
            project.current_image.id
        );

        Ok(project)
    }

    fn lock_for(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }

    /// Drops the lock of a project that is gone, unless a request still waits on it
    fn forget_lock(&self, id: Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&id);
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_create_request(req: &CreateProject) -> Result<()> {
    if req.name.trim().is_empty() {
        return Err(ProjectError::ValidationError(
            "Project name cannot be empty".to_string(),
        ));
    }

    if req.name.len() > 255 {
        return Err(ProjectError::ValidationError(
            "Project name is too long (max 255 characters)".to_string(),
        ));
    }

    if let Some(max_versions) = req.max_versions {
        if !(1..=MAX_VERSIONS_LIMIT).contains(&max_versions) {
            return Err(ProjectError::ValidationError(format!(
                "max_versions must be between 1 and {}",
                MAX_VERSIONS_LIMIT
            )));
        }
    }

    validate_image(&req.original_image, "original_image")
}

fn validate_image(image: &ImageRef, field: &str) -> Result<()> {
    if image.id.trim().is_empty() || image.url.trim().is_empty() {
        return Err(ProjectError::ValidationError(format!(
            "{} needs both an id and a url",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryProjectRepository;
    use darkroom_core::domain::operation::OperationType;
    use serde_json::Map;

    fn image(name: &str) -> ImageRef {
        ImageRef::new(
            format!("edits/{}", name),
            format!("http://images.test/edits/{}.png", name),
        )
    }

    fn service(max_versions: usize) -> ProjectService {
        ProjectService::new(Arc::new(MemoryProjectRepository::new()), max_versions)
    }

    async fn project(service: &ProjectService) -> Project {
        service
            .create_project(CreateProject {
                name: "portrait".to_string(),
                original_image: image("original"),
                max_versions: None,
            })
            .await
            .unwrap()
    }

    fn append(output: &str) -> AppendOperation {
        AppendOperation {
            operation_type: OperationType::Enhance,
            parameters: Map::new(),
            input_image: None,
            output_image: image(output),
        }
    }

    #[tokio::test]
    async fn test_append_undo_revert() {
        let service = service(20);
        let id = project(&service).await.id;

        service.append_operation(id, append("a")).await.unwrap();
        service.append_operation(id, append("b")).await.unwrap();
        let after_c = service.append_operation(id, append("c")).await.unwrap();
        assert_eq!(after_c.current_image, image("c"));
        assert_eq!(after_c.operations[2].input_image, image("b"));

        let undone = service.undo(id).await.unwrap();
        assert_eq!(undone.current_image, image("b"));

        let reverted = service.revert(id, -1).await.unwrap();
        assert!(reverted.operations.is_empty());
        assert_eq!(reverted.current_image, image("original"));

        let stored = service.get_project(id).await.unwrap();
        assert_eq!(stored, reverted);
    }

    #[tokio::test]
    async fn test_history_errors_leave_project_unchanged() {
        let service = service(20);
        let id = project(&service).await.id;

        assert!(matches!(
            service.undo(id).await,
            Err(ProjectError::History(HistoryError::NothingToUndo))
        ));

        service.append_operation(id, append("a")).await.unwrap();
        assert!(matches!(
            service.revert(id, 1).await,
            Err(ProjectError::History(HistoryError::InvalidRevertIndex { index: 1, len: 1 }))
        ));
        assert_eq!(service.get_project(id).await.unwrap().operations.len(), 1);
    }

    #[tokio::test]
    async fn test_default_retention_applies() {
        let service = service(2);
        let id = project(&service).await.id;

        for name in ["a", "b", "c"] {
            service.append_operation(id, append(name)).await.unwrap();
        }

        let project = service.get_project(id).await.unwrap();
        assert_eq!(project.max_versions, 2);
        let outputs: Vec<_> = project.operations.iter().map(|op| op.output_image.clone()).collect();
        assert_eq!(outputs, vec![image("b"), image("c")]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let service = Arc::new(service(50));
        let id = project(&service).await.id;

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .append_operation(id, append(&format!("edit-{}", i)))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let project = service.get_project(id).await.unwrap();
        assert_eq!(project.operations.len(), 16);
        assert!(project.is_consistent());
    }

    #[tokio::test]
    async fn test_validation_and_missing_projects() {
        let service = service(20);

        let err = service
            .create_project(CreateProject {
                name: "  ".to_string(),
                original_image: image("original"),
                max_versions: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectError::ValidationError(_)));

        let err = service
            .create_project(CreateProject {
                name: "zero".to_string(),
                original_image: image("original"),
                max_versions: Some(0),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectError::ValidationError(_)));

        let err = service
            .create_project(CreateProject {
                name: "huge".to_string(),
                original_image: image("original"),
                max_versions: Some(MAX_VERSIONS_LIMIT + 1),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectError::ValidationError(_)));

        let missing = Uuid::new_v4();
        assert!(matches!(
            service.undo(missing).await,
            Err(ProjectError::NotFound(id)) if id == missing
        ));
        assert!(matches!(
            service.delete_project(missing).await,
            Err(ProjectError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_projects_do_not_keep_locks() {
        let service = service(20);

        for _ in 0..32 {
            let missing = Uuid::new_v4();
            assert!(service.undo(missing).await.is_err());
            assert!(service.revert(missing, -1).await.is_err());
            assert!(service.append_operation(missing, append("a")).await.is_err());
            assert!(service.delete_project(missing).await.is_err());
        }
        assert_eq!(service.locks.lock().unwrap().len(), 0);

        let id = project(&service).await.id;
        service.append_operation(id, append("a")).await.unwrap();
        service.delete_project(id).await.unwrap();
        assert_eq!(service.locks.lock().unwrap().len(), 0);
    }
}
