use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            original_image_id TEXT NOT NULL,
            original_image_url TEXT NOT NULL,
            current_image_id TEXT NOT NULL,
            current_image_url TEXT NOT NULL,
            max_versions INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per retained operation; position is the history index
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS project_operations (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            operation_type VARCHAR(50) NOT NULL,
            parameters JSONB NOT NULL DEFAULT '{}',
            input_image_id TEXT NOT NULL,
            input_image_url TEXT NOT NULL,
            output_image_id TEXT NOT NULL,
            output_image_url TEXT NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL,
            status VARCHAR(20) NOT NULL,
            UNIQUE (project_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_projects_updated_at ON projects(updated_at DESC)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_project_operations_project ON project_operations(project_id, position)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
