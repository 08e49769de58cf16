//! Service Module
//!
//! Business logic layer of the server.
//! Services sit between the HTTP handlers, the repositories and the engine.

pub mod edit;
pub mod project;

pub use edit as edit_service;
pub use project as project_service;
