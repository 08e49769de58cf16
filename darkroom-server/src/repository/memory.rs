//! In-memory project repository

use async_trait::async_trait;
use darkroom_core::domain::project::Project;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ProjectRepository;

#[derive(Debug, Default)]
pub struct MemoryProjectRepository {
    projects: RwLock<HashMap<Uuid, Project>>,
}

impl MemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for MemoryProjectRepository {
    async fn create(&self, project: &Project) -> Result<(), sqlx::Error> {
        self.projects
            .write()
            .await
            .insert(project.id, project.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>, sqlx::Error> {
        Ok(self.projects.read().await.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Project>, sqlx::Error> {
        let mut projects: Vec<Project> = self.projects.read().await.values().cloned().collect();
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    async fn save(&self, project: &Project) -> Result<bool, sqlx::Error> {
        let mut projects = self.projects.write().await;
        match projects.get_mut(&project.id) {
            Some(stored) => {
                *stored = project.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(self.projects.write().await.remove(&id).is_some())
    }
}
