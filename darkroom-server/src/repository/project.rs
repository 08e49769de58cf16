//! Project Repository
//!
//! Handles all database operations related to projects. A project row
//! holds the aggregate's scalar fields; its history lives in
//! `project_operations`, ordered by `position`.

use async_trait::async_trait;
use darkroom_core::domain::image::ImageRef;
use darkroom_core::domain::operation::{Operation, OperationStatus, OperationType};
use darkroom_core::domain::project::Project;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use super::ProjectRepository;

const PROJECT_COLUMNS: &str = r#"
    id, name, original_image_id, original_image_url,
    current_image_id, current_image_url, max_versions, created_at, updated_at
"#;

const OPERATION_COLUMNS: &str = r#"
    id, project_id, position, operation_type, parameters,
    input_image_id, input_image_url, output_image_id, output_image_url, timestamp, status
"#;

/// Postgres-backed project repository
#[derive(Debug, Clone)]
pub struct PgProjectRepository {
    pool: PgPool,
}

impl PgProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepository for PgProjectRepository {
    async fn create(&self, project: &Project) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO projects (
                id, name, original_image_id, original_image_url,
                current_image_id, current_image_url, max_versions, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(project.id)
        .bind(&project.name)
        .bind(&project.original_image.id)
        .bind(&project.original_image.url)
        .bind(&project.current_image.id)
        .bind(&project.current_image.url)
        .bind(max_versions_column(project.max_versions)?)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_operations(&mut tx, project).await?;
        tx.commit().await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>, sqlx::Error> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM projects WHERE id = $1",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let operations = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {} FROM project_operations WHERE project_id = $1 ORDER BY position",
            OPERATION_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        row.into_project(operations).map(Some)
    }

    async fn list_all(&self) -> Result<Vec<Project>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM projects ORDER BY updated_at DESC",
            PROJECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let operations = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {} FROM project_operations ORDER BY project_id, position",
            OPERATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut by_project: HashMap<Uuid, Vec<OperationRow>> = HashMap::new();
        for op in operations {
            by_project.entry(op.project_id).or_default().push(op);
        }

        rows.into_iter()
            .map(|row| {
                let ops = by_project.remove(&row.id).unwrap_or_default();
                row.into_project(ops)
            })
            .collect()
    }

    async fn save(&self, project: &Project) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE projects
            SET name = $1, current_image_id = $2, current_image_url = $3,
                max_versions = $4, updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(&project.name)
        .bind(&project.current_image.id)
        .bind(&project.current_image.url)
        .bind(max_versions_column(project.max_versions)?)
        .bind(project.updated_at)
        .bind(project.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        // History is rewritten whole: undo, revert and trimming all drop rows
        sqlx::query("DELETE FROM project_operations WHERE project_id = $1")
            .bind(project.id)
            .execute(&mut *tx)
            .await?;

        insert_operations(&mut tx, project).await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Converts a retention bound to its INT column value
fn max_versions_column(max_versions: usize) -> Result<i32, sqlx::Error> {
    i32::try_from(max_versions).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

async fn insert_operations(
    tx: &mut Transaction<'_, Postgres>,
    project: &Project,
) -> Result<(), sqlx::Error> {
    for (position, op) in project.operations.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO project_operations (
                id, project_id, position, operation_type, parameters,
                input_image_id, input_image_url, output_image_id, output_image_url,
                timestamp, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(op.id)
        .bind(project.id)
        .bind(position as i32)
        .bind(op.operation_type.as_str())
        .bind(serde_json::Value::Object(op.parameters.clone()))
        .bind(&op.input_image.id)
        .bind(&op.input_image.url)
        .bind(&op.output_image.id)
        .bind(&op.output_image.url)
        .bind(op.timestamp)
        .bind(op.status.to_string())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    original_image_id: String,
    original_image_url: String,
    current_image_id: String,
    current_image_url: String,
    max_versions: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl ProjectRow {
    fn into_project(self, operations: Vec<OperationRow>) -> Result<Project, sqlx::Error> {
        let operations = operations
            .into_iter()
            .map(Operation::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Project {
            id: self.id,
            name: self.name,
            original_image: ImageRef::new(self.original_image_id, self.original_image_url),
            current_image: ImageRef::new(self.current_image_id, self.current_image_url),
            operations,
            max_versions: usize::try_from(self.max_versions)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
                .max(1),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OperationRow {
    id: Uuid,
    project_id: Uuid,
    #[allow(dead_code)]
    position: i32,
    operation_type: String,
    parameters: serde_json::Value,
    input_image_id: String,
    input_image_url: String,
    output_image_id: String,
    output_image_url: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    status: String,
}

impl TryFrom<OperationRow> for Operation {
    type Error = sqlx::Error;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        let operation_type = row
            .operation_type
            .parse::<OperationType>()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

        let status = match row.status.as_str() {
            "completed" => OperationStatus::Completed,
            "failed" => OperationStatus::Failed,
            other => {
                return Err(sqlx::Error::Decode(
                    format!("Unknown operation status: {}", other).into(),
                ));
            }
        };

        let parameters = match row.parameters {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        Ok(Operation {
            id: row.id,
            operation_type,
            parameters,
            input_image: ImageRef::new(row.input_image_id, row.input_image_url),
            output_image: ImageRef::new(row.output_image_id, row.output_image_url),
            timestamp: row.timestamp,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_versions_column_rejects_out_of_range_values() {
        assert_eq!(max_versions_column(20).unwrap(), 20);
        assert!(matches!(
            max_versions_column(usize::MAX),
            Err(sqlx::Error::Encode(_))
        ));
    }
}
