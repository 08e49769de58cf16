//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod edit;
mod project;

pub use edit::EditCommands;
pub use project::ProjectCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Project and history management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Run edits against a project
    Edit {
        #[command(subcommand)]
        command: EditCommands,
    },
    /// Check that the server is reachable
    Health,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Project { command } => project::handle_project_command(command, config).await,
        Commands::Edit { command } => edit::handle_edit_command(command, config).await,
        Commands::Health => {
            config.client()?.health().await?;
            println!("Server at {} is healthy", config.server_url);
            Ok(())
        }
    }
}
