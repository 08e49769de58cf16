//! Darkroom Engine
//!
//! Container-backed image edit pipelines.
//!
//! This crate contains:
//! - Execution units: registry, lifecycle and the container runtime boundary
//! - Stage execution with per-request artifact staging and cleanup
//! - The pipeline coordinator and the named edit pipelines
//! - Adapters for the external image store and the classifier service

pub mod artifact;
pub mod classifier;
pub mod config;
pub mod lifecycle;
pub mod pipeline;
pub mod registry;
pub mod runtime;
pub mod stage;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use pipeline::{EditEngine, PipelineCoordinator, PipelineError};
