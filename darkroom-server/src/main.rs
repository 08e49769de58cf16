use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use darkroom_engine::PipelineCoordinator;
use darkroom_engine::runtime::check_runtime_available;

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

#[cfg(test)]
mod testing;

use config::Config;
use repository::{MemoryProjectRepository, PgProjectRepository, ProjectRepository};
use service::edit::EditService;
use service::project::ProjectService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "darkroom_server=debug,darkroom_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Darkroom server...");

    let config = Config::from_env()?;
    config.validate()?;

    // Units are started lazily; a missing runtime only fails edits
    if let Err(e) = check_runtime_available(&config.engine.runtime).await {
        tracing::warn!("Container runtime check failed: {:#}", e);
    }

    let coordinator = PipelineCoordinator::from_config(&config.engine)
        .context("Failed to build the pipeline coordinator")?;
    let classifier = coordinator.classifier();

    let repo: Arc<dyn ProjectRepository> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url)
                .await
                .context("Failed to create database pool")?;
            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Arc::new(PgProjectRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, projects are kept in memory");
            Arc::new(MemoryProjectRepository::new())
        }
    };

    let projects = Arc::new(ProjectService::new(repo, config.max_versions));
    let edits = Arc::new(EditService::new(
        projects.clone(),
        Arc::new(coordinator),
        classifier,
        config.engine.classifier_timeout,
    ));

    // Build router with all API endpoints
    let app = api::create_router(api::AppState { projects, edits });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}
