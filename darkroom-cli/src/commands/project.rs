//! Project command handlers
//!
//! Handles project creation, listing, viewing and deletion, plus the
//! history commands: timeline, append, undo and revert.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use darkroom_core::domain::image::ImageRef;
use darkroom_core::domain::operation::OperationType;
use darkroom_core::domain::project::{Project, TimelineEntry};
use darkroom_core::dto::project::{AppendOperation, CreateProject, ProjectSummary};
use serde_json::{Map, Value as JsonValue};

use crate::config::Config;
use crate::id_resolver::resolve_project_id;
use crate::types::IdOrPrefix;
use darkroom_client::DarkroomClient;

/// Project subcommands
#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project around an uploaded image
    Create {
        /// Project name
        #[arg(short, long)]
        name: String,

        /// Store identifier of the original image
        #[arg(long)]
        image_id: String,

        /// URL of the original image
        #[arg(long)]
        image_url: String,

        /// Number of operations kept in history
        #[arg(long)]
        max_versions: Option<usize>,
    },
    /// List all projects
    List,
    /// Get project details
    Get {
        /// Project ID or unambiguous prefix
        id: String,
    },
    /// Delete a project
    Delete {
        /// Project ID or unambiguous prefix
        id: String,
    },
    /// Show the original image and every retained operation
    Timeline {
        /// Project ID or unambiguous prefix
        id: String,
    },
    /// Record an edit produced outside the server
    Append {
        /// Project ID or unambiguous prefix
        id: String,

        /// Operation type (e.g. relight, enhance)
        #[arg(short = 't', long)]
        operation_type: OperationType,

        /// Store identifier of the produced image
        #[arg(long)]
        output_id: String,

        /// URL of the produced image
        #[arg(long)]
        output_url: String,

        /// Parameters as key=value pairs
        #[arg(short, long, value_parser = parse_key_val)]
        param: Vec<(String, String)>,
    },
    /// Undo the last operation
    Undo {
        /// Project ID or unambiguous prefix
        id: String,
    },
    /// Revert to a timeline index (-1 = original image)
    Revert {
        /// Project ID or unambiguous prefix
        id: String,

        #[arg(allow_negative_numbers = true)]
        index: i64,
    },
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Handle project commands
pub async fn handle_project_command(command: ProjectCommands, config: &Config) -> Result<()> {
    let client = config.client()?;

    match command {
        ProjectCommands::Create {
            name,
            image_id,
            image_url,
            max_versions,
        } => {
            let req = CreateProject {
                name,
                original_image: ImageRef::new(image_id, image_url),
                max_versions,
            };
            create_project(&client, req).await
        }
        ProjectCommands::List => list_projects(&client).await,
        ProjectCommands::Get { id } => get_project(&client, &id).await,
        ProjectCommands::Delete { id } => delete_project(&client, &id).await,
        ProjectCommands::Timeline { id } => show_timeline(&client, &id).await,
        ProjectCommands::Append {
            id,
            operation_type,
            output_id,
            output_url,
            param,
        } => {
            let parameters: Map<String, JsonValue> = param
                .into_iter()
                .map(|(k, v)| (k, JsonValue::String(v)))
                .collect();
            let req = AppendOperation {
                operation_type,
                parameters,
                input_image: None,
                output_image: ImageRef::new(output_id, output_url),
            };
            append_operation(&client, &id, req).await
        }
        ProjectCommands::Undo { id } => undo(&client, &id).await,
        ProjectCommands::Revert { id, index } => revert(&client, &id, index).await,
    }
}

async fn create_project(client: &DarkroomClient, req: CreateProject) -> Result<()> {
    let project = client.create_project(req).await?;

    println!("{}", "✓ Project created successfully!".green().bold());
    println!("  ID:       {}", project.id.to_string().cyan());
    println!("  Name:     {}", project.name.bold());
    println!("  Image:    {}", project.original_image.url.dimmed());
    println!("  Versions: {}", project.max_versions.to_string().dimmed());

    Ok(())
}

async fn list_projects(client: &DarkroomClient) -> Result<()> {
    let projects = client.list_projects().await?;

    if projects.is_empty() {
        println!("{}", "No projects found.".yellow());
    } else {
        println!("{}", format!("Found {} project(s):", projects.len()).bold());
        println!();
        for project in projects {
            print_project_summary(&project);
        }
    }

    Ok(())
}

async fn get_project(client: &DarkroomClient, id: &str) -> Result<()> {
    let uuid = resolve_project_id(client, &IdOrPrefix::parse(id)).await?;
    let project = client.get_project(uuid).await?;

    print_project_details(&project);

    Ok(())
}

async fn delete_project(client: &DarkroomClient, id: &str) -> Result<()> {
    let uuid = resolve_project_id(client, &IdOrPrefix::parse(id)).await?;

    client.delete_project(uuid).await?;

    println!(
        "{}",
        format!("✓ Project {} deleted successfully!", uuid)
            .green()
            .bold()
    );

    Ok(())
}

async fn show_timeline(client: &DarkroomClient, id: &str) -> Result<()> {
    let uuid = resolve_project_id(client, &IdOrPrefix::parse(id)).await?;
    let timeline = client.timeline(uuid).await?;

    println!("{}", "Timeline:".bold());
    for entry in &timeline {
        print_timeline_entry(entry);
    }

    Ok(())
}

async fn append_operation(client: &DarkroomClient, id: &str, req: AppendOperation) -> Result<()> {
    let uuid = resolve_project_id(client, &IdOrPrefix::parse(id)).await?;
    let project = client.append_operation(uuid, req).await?;

    println!("{}", "✓ Operation recorded".green().bold());
    print_current(&project);

    Ok(())
}

async fn undo(client: &DarkroomClient, id: &str) -> Result<()> {
    let uuid = resolve_project_id(client, &IdOrPrefix::parse(id)).await?;
    let project = client.undo(uuid).await?;

    println!("{}", "✓ Last operation undone".green().bold());
    print_current(&project);

    Ok(())
}

async fn revert(client: &DarkroomClient, id: &str, index: i64) -> Result<()> {
    let uuid = resolve_project_id(client, &IdOrPrefix::parse(id)).await?;
    let project = client.revert(uuid, index).await?;

    println!(
        "{}",
        format!("✓ Reverted to index {}", index).green().bold()
    );
    print_current(&project);

    Ok(())
}

fn print_project_summary(project: &ProjectSummary) {
    println!("  {} {}", "▸".cyan(), project.name.bold());
    println!("    ID:         {}", project.id.to_string().dimmed());
    println!(
        "    Operations: {}",
        project.operation_count.to_string().dimmed()
    );
    println!(
        "    Updated:    {}",
        project
            .updated_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_project_details(project: &Project) {
    println!("{}", "Project Details:".bold());
    println!("  ID:        {}", project.id.to_string().cyan());
    println!("  Name:      {}", project.name.bold());
    println!("  Original:  {}", project.original_image.url);
    println!("  Current:   {}", project.current_image.url);
    println!(
        "  History:   {}/{} operation(s)",
        project.operations.len(),
        project.max_versions
    );
    println!(
        "  Created:   {}",
        project.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:   {}",
        project.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    if !project.operations.is_empty() {
        println!("\n{}", "Operations:".bold());
        for (idx, op) in project.operations.iter().enumerate() {
            println!(
                "  [{}] {} {}",
                idx,
                op.operation_type.to_string().cyan(),
                JsonValue::Object(op.parameters.clone()).to_string().dimmed()
            );
        }
    }
}

fn print_timeline_entry(entry: &TimelineEntry) {
    let label = entry
        .operation_type
        .map(|op| op.to_string())
        .unwrap_or_else(|| "original".to_string());
    let marker = if entry.is_current { "●".green() } else { "○".dimmed() };

    println!(
        "  {} {:>3}  {:<20} {}  {}",
        marker,
        entry.index,
        label,
        entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        entry.image.url
    );
}

fn print_current(project: &Project) {
    println!("  Operations: {}", project.operations.len());
    println!("  Current:    {}", project.current_image.url.cyan());
}
