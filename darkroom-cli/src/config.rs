//! Configuration module
//!
//! Handles CLI configuration including the server URL and request timeout.

use anyhow::{Context, Result};
use darkroom_client::DarkroomClient;
use std::time::Duration;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the Darkroom server
    pub server_url: String,
    pub timeout_seconds: u64,
}

impl Config {
    /// Build a client honoring the configured timeout
    pub fn client(&self) -> Result<DarkroomClient> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(DarkroomClient::with_client(&self.server_url, http))
    }
}
