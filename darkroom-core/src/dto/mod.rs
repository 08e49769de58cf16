//! Data Transfer Objects for the HTTP API
//!
//! Request and response bodies exchanged between the server and its
//! clients (the client library and the CLI).

pub mod edit;
pub mod project;
