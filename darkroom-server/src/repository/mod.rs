//! Repository Module
//!
//! Data access layer for projects. Postgres backs production deployments;
//! the in-memory repository serves single-process setups and tests.

pub mod memory;
pub mod project;

use async_trait::async_trait;
use darkroom_core::domain::project::Project;
use uuid::Uuid;

pub use memory::MemoryProjectRepository;
pub use project::PgProjectRepository;

/// Persistence of project aggregates
///
/// Projects are always stored and loaded whole, history included.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> Result<(), sqlx::Error>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>, sqlx::Error>;

    /// All projects, most recently updated first
    async fn list_all(&self) -> Result<Vec<Project>, sqlx::Error>;

    /// Replaces the stored state of an existing project
    ///
    /// Returns false when the project does not exist.
    async fn save(&self, project: &Project) -> Result<bool, sqlx::Error>;

    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error>;
}
