//! Edit DTOs
//!
//! Bodies for running pipelines against a project and the results they
//! report back.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::image::ImageRef;
use crate::domain::intent::ModelVariant;
use crate::domain::operation::OperationType;
use crate::domain::project::Project;

/// How the segmentation model variant was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantSource {
    /// Supplied by the caller
    Explicit,
    /// Suggested by the classifier
    Classifier,
    /// Classifier failed or timed out
    Fallback,
}

/// An additional image produced by a pipeline besides its main output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedImage {
    pub name: String,
    pub image: ImageRef,
}

/// Outcome of one successful pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditResult {
    pub pipeline: String,
    pub operation_type: OperationType,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub input_image: ImageRef,
    pub output_image: ImageRef,
    #[serde(default)]
    pub extra_images: Vec<NamedImage>,
    #[serde(default)]
    pub model_variant: Option<ModelVariant>,
    #[serde(default)]
    pub variant_source: Option<VariantSource>,
    pub elapsed_ms: u64,
}

/// Response to an applied edit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditResponse {
    pub project: Project,
    pub result: EditResult,
}

/// Free-text edit instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

/// Response to a free-text edit instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PromptResponse {
    Applied {
        project: Project,
        result: EditResult,
    },
    Unsupported {
        feature: String,
        message: String,
        supported_features: Vec<String>,
    },
}

/// Enhancements an image would benefit from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub needed_enhancements: Vec<String>,
    #[serde(default)]
    pub severity: HashMap<String, f32>,
    /// Set when the analysis could not run and this is an empty default
    #[serde(default)]
    pub degraded: bool,
}
