//! Operation domain types
//!
//! An operation is one completed, recorded edit in a project's history.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::image::ImageRef;

/// A recorded edit
///
/// Created only from a successful pipeline run and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub operation_type: OperationType,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub input_image: ImageRef,
    pub output_image: ImageRef,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub status: OperationStatus,
}

impl Operation {
    /// Creates a completed operation stamped with the current time
    pub fn completed(
        operation_type: OperationType,
        parameters: serde_json::Map<String, serde_json::Value>,
        input_image: ImageRef,
        output_image: ImageRef,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_type,
            parameters,
            input_image,
            output_image,
            timestamp: chrono::Utc::now(),
            status: OperationStatus::Completed,
        }
    }
}

/// Kind of edit an operation records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    Relight,
    Enhance,
    FaceRestore,
    StyleTransfer,
    RemoveBackground,
    ObjectRemoval,
    BackgroundReplace,
}

impl OperationType {
    pub const ALL: [OperationType; 7] = [
        OperationType::Relight,
        OperationType::Enhance,
        OperationType::FaceRestore,
        OperationType::StyleTransfer,
        OperationType::RemoveBackground,
        OperationType::ObjectRemoval,
        OperationType::BackgroundReplace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Relight => "relight",
            OperationType::Enhance => "enhance",
            OperationType::FaceRestore => "face-restore",
            OperationType::StyleTransfer => "style-transfer",
            OperationType::RemoveBackground => "remove-background",
            OperationType::ObjectRemoval => "object-removal",
            OperationType::BackgroundReplace => "background-replace",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown operation type: {}", s))
    }
}

/// Operation status
///
/// History only ever holds completed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Completed => write!(f, "completed"),
            OperationStatus::Failed => write!(f, "failed"),
        }
    }
}
