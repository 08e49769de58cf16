//! Core domain types
//!
//! Shared between the server (persists and mutates history) and the
//! engine (executes intents and produces images).

pub mod image;
pub mod intent;
pub mod operation;
pub mod project;
