//! Darkroom Core
//!
//! Core types shared by the Darkroom engine, server, client and CLI.
//!
//! This crate contains:
//! - Domain types: images, operations, the project edit-history aggregate and edit intents
//! - DTOs: request and response bodies of the HTTP API

pub mod domain;
pub mod dto;
