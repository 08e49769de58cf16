//! Project domain model
//!
//! A project is the edit-history aggregate for one uploaded image. It owns
//! the original image, the ordered log of operations applied on top of it
//! and the derived current image.
//!
//! The current image always equals the output of the last retained
//! operation, or the original image when the log is empty. Every mutation
//! below preserves that.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::image::ImageRef;
use crate::domain::operation::{Operation, OperationType};

/// Default retention bound for a project's operation log
pub const DEFAULT_MAX_VERSIONS: usize = 20;

/// Largest retention bound a project may ask for
pub const MAX_VERSIONS_LIMIT: usize = 10_000;

/// Index addressing the original image in the timeline
pub const ORIGINAL_INDEX: i64 = -1;

/// Edit-history aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub original_image: ImageRef,
    pub current_image: ImageRef,
    pub operations: Vec<Operation>,
    pub max_versions: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Errors raised by history mutations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Invalid revert index {index} for a history of {len} operation(s)")]
    InvalidRevertIndex { index: i64, len: usize },
}

/// One point in a project's timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// -1 for the original image, otherwise the operation index
    pub index: i64,
    pub operation_type: Option<OperationType>,
    pub image: ImageRef,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub is_current: bool,
}

impl Project {
    /// Creates an empty project around a freshly uploaded image
    pub fn new(name: impl Into<String>, original_image: ImageRef, max_versions: usize) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            current_image: original_image.clone(),
            original_image,
            operations: Vec::new(),
            max_versions: max_versions.clamp(1, MAX_VERSIONS_LIMIT),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a completed operation and makes its output current
    ///
    /// The input defaults to the current image. Oldest entries are dropped
    /// while the log is longer than `max_versions`.
    pub fn add_operation(
        &mut self,
        operation_type: OperationType,
        parameters: serde_json::Map<String, serde_json::Value>,
        input_image: Option<ImageRef>,
        output_image: ImageRef,
    ) -> &Operation {
        let input_image = input_image.unwrap_or_else(|| self.current_image.clone());
        let operation = Operation::completed(operation_type, parameters, input_image, output_image);
        self.push(operation);
        // push never leaves the log empty
        &self.operations[self.operations.len() - 1]
    }

    /// Appends an already built operation
    pub fn push(&mut self, operation: Operation) {
        self.current_image = operation.output_image.clone();
        self.operations.push(operation);
        self.trim();
        self.touch();
    }

    /// Removes the last operation
    pub fn undo_last_operation(&mut self) -> Result<Operation, HistoryError> {
        let removed = self.operations.pop().ok_or(HistoryError::NothingToUndo)?;
        self.sync_current();
        self.touch();
        Ok(removed)
    }

    /// Truncates the log so that `index` is the last retained operation
    ///
    /// `-1` resets to the original image. Out-of-range indices leave the
    /// project untouched.
    pub fn revert_to_operation(&mut self, index: i64) -> Result<Vec<Operation>, HistoryError> {
        let len = self.operations.len();
        if index < ORIGINAL_INDEX || index >= len as i64 {
            return Err(HistoryError::InvalidRevertIndex { index, len });
        }

        let keep = (index + 1) as usize;
        let removed = self.operations.split_off(keep);
        self.sync_current();
        self.touch();
        Ok(removed)
    }

    /// Lists the original image followed by every retained operation
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        let current = self.current_index();
        let mut entries = Vec::with_capacity(self.operations.len() + 1);

        entries.push(TimelineEntry {
            index: ORIGINAL_INDEX,
            operation_type: None,
            image: self.original_image.clone(),
            timestamp: self.created_at,
            is_current: current == ORIGINAL_INDEX,
        });

        for (idx, op) in self.operations.iter().enumerate() {
            entries.push(TimelineEntry {
                index: idx as i64,
                operation_type: Some(op.operation_type),
                image: op.output_image.clone(),
                timestamp: op.timestamp,
                is_current: current == idx as i64,
            });
        }

        entries
    }

    /// Index of the entry the current image comes from
    pub fn current_index(&self) -> i64 {
        self.operations.len() as i64 - 1
    }

    /// Whether the current image matches the history log
    pub fn is_consistent(&self) -> bool {
        match self.operations.last() {
            Some(op) => self.current_image == op.output_image,
            None => self.current_image == self.original_image,
        }
    }

    fn trim(&mut self) {
        if self.operations.len() > self.max_versions {
            let excess = self.operations.len() - self.max_versions;
            self.operations.drain(..excess);
        }
    }

    fn sync_current(&mut self) {
        self.current_image = match self.operations.last() {
            Some(op) => op.output_image.clone(),
            None => self.original_image.clone(),
        };
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}
