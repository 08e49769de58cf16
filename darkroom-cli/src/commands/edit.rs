//! Edit command handlers
//!
//! Runs typed edits, free-text prompts and quality analysis against a
//! project's current image.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use darkroom_core::domain::image::ImageRef;
use darkroom_core::domain::intent::{
    DEFAULT_BRIGHTNESS, DEFAULT_FIDELITY, DEFAULT_STYLE, EnhanceMode, Intent, LightDirection,
    ModelVariant,
};
use darkroom_core::dto::edit::{EditResult, PromptResponse};

use crate::config::Config;
use crate::id_resolver::resolve_project_id;
use crate::types::IdOrPrefix;
use darkroom_client::{ClientError, DarkroomClient};

/// Edit subcommands
#[derive(Subcommand)]
pub enum EditCommands {
    /// Apply a typed edit
    Apply {
        /// Project ID or unambiguous prefix
        id: String,

        #[command(subcommand)]
        kind: EditKind,
    },
    /// Describe an edit in plain words
    Prompt {
        /// Project ID or unambiguous prefix
        id: String,

        /// Instruction, e.g. "make it brighter from the left"
        text: String,
    },
    /// Suggest enhancements for the current image
    Quality {
        /// Project ID or unambiguous prefix
        id: String,
    },
}

/// Typed edits
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum EditKind {
    /// Relight the image
    Relight {
        #[arg(long, default_value_t = DEFAULT_BRIGHTNESS)]
        brightness: f32,

        /// front, left, right, top or bottom
        #[arg(long, default_value = "front")]
        direction: LightDirection,
    },
    /// Denoise or deblur
    Enhance {
        #[arg(long, default_value = "denoise")]
        mode: EnhanceMode,
    },
    /// Restore faces
    FaceRestore {
        #[arg(long, default_value_t = DEFAULT_FIDELITY)]
        fidelity: f32,
    },
    /// Apply an artistic style
    Style {
        #[arg(long, default_value = DEFAULT_STYLE)]
        style: String,
    },
    /// Split foreground and background into layers
    RemoveBackground {
        /// human or general; chosen by the classifier when omitted
        #[arg(long)]
        model_type: Option<ModelVariant>,
    },
    /// Remove the object under a point
    RemoveObject { x: u32, y: u32 },
    /// Put the subject on another background
    ReplaceBackground {
        /// Store identifier of the background image
        #[arg(long)]
        background_id: String,

        /// URL of the background image
        #[arg(long)]
        background_url: String,

        #[arg(long)]
        model_type: Option<ModelVariant>,
    },
}

impl From<EditKind> for Intent {
    fn from(kind: EditKind) -> Self {
        match kind {
            EditKind::Relight {
                brightness,
                direction,
            } => Intent::Relight {
                brightness,
                direction,
            },
            EditKind::Enhance { mode } => Intent::Enhance { mode },
            EditKind::FaceRestore { fidelity } => Intent::FaceRestore { fidelity },
            EditKind::Style { style } => Intent::StyleTransfer { style },
            EditKind::RemoveBackground { model_type } => Intent::RemoveBackground { model_type },
            EditKind::RemoveObject { x, y } => Intent::ObjectRemoval { x, y },
            EditKind::ReplaceBackground {
                background_id,
                background_url,
                model_type,
            } => Intent::BackgroundReplace {
                background: ImageRef::new(background_id, background_url),
                model_type,
            },
        }
    }
}

/// Handle edit commands
pub async fn handle_edit_command(command: EditCommands, config: &Config) -> Result<()> {
    let client = config.client()?;

    match command {
        EditCommands::Apply { id, kind } => apply(&client, &id, kind.into()).await,
        EditCommands::Prompt { id, text } => prompt(&client, &id, &text).await,
        EditCommands::Quality { id } => quality(&client, &id).await,
    }
}

async fn apply(client: &DarkroomClient, id: &str, intent: Intent) -> Result<()> {
    let uuid = resolve_project_id(client, &IdOrPrefix::parse(id)).await?;

    println!("{}", format!("Running {}...", intent.operation_type()).dimmed());
    let response = client.apply(uuid, &intent).await.map_err(explain)?;

    print_result(&response.result);
    println!(
        "  History: {} operation(s)",
        response.project.operations.len()
    );

    Ok(())
}

async fn prompt(client: &DarkroomClient, id: &str, text: &str) -> Result<()> {
    let uuid = resolve_project_id(client, &IdOrPrefix::parse(id)).await?;

    match client.prompt(uuid, text).await.map_err(explain)? {
        PromptResponse::Applied { result, .. } => print_result(&result),
        PromptResponse::Unsupported {
            feature,
            message,
            supported_features,
        } => {
            println!(
                "{}",
                format!("✗ '{}' is not supported", feature).yellow().bold()
            );
            println!("  {}", message);
            println!("  Supported: {}", supported_features.join(", ").cyan());
        }
    }

    Ok(())
}

async fn quality(client: &DarkroomClient, id: &str) -> Result<()> {
    let uuid = resolve_project_id(client, &IdOrPrefix::parse(id)).await?;
    let report = client.quality(uuid).await.map_err(explain)?;

    if report.degraded {
        println!("{}", "Quality analysis is unavailable right now.".yellow());
    } else if report.needed_enhancements.is_empty() {
        println!("{}", "No enhancements needed.".green());
    } else {
        println!("{}", "Suggested enhancements:".bold());
        for name in &report.needed_enhancements {
            match report.severity.get(name) {
                Some(severity) => println!("  {} {} ({:.2})", "▸".cyan(), name, severity),
                None => println!("  {} {}", "▸".cyan(), name),
            }
        }
    }

    Ok(())
}

fn print_result(result: &EditResult) {
    println!(
        "{}",
        format!("✓ {} finished in {} ms", result.pipeline, result.elapsed_ms)
            .green()
            .bold()
    );
    println!("  Output:  {}", result.output_image.url.cyan());
    for extra in &result.extra_images {
        println!("  {:<8} {}", format!("{}:", extra.name), extra.image.url);
    }
    if let (Some(variant), Some(source)) = (result.model_variant, result.variant_source) {
        println!("  Model:   {} ({:?})", variant, source);
    }
}

/// Attach the failing stage or quota hint to API errors
fn explain(err: ClientError) -> anyhow::Error {
    if err.is_quota_exceeded() {
        return anyhow::anyhow!("{}. Try again later or use a typed edit.", err);
    }
    match err.stage() {
        Some(stage) => anyhow::anyhow!("{} (failed stage: {})", err, stage),
        None => err.into(),
    }
}
