//! Darkroom HTTP Client
//!
//! A type-safe HTTP client for the Darkroom server API: projects, their
//! edit history, and the edits that run against them.
//!
//! # Example
//!
//! ```no_run
//! use darkroom_client::DarkroomClient;
//! use darkroom_core::domain::intent::{EnhanceMode, Intent};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DarkroomClient::new("http://localhost:8080");
//!
//!     let project_id = Uuid::new_v4();
//!     let response = client
//!         .apply(project_id, &Intent::Enhance { mode: EnhanceMode::Denoise })
//!         .await?;
//!
//!     println!("New current image: {}", response.project.current_image.url);
//!     Ok(())
//! }
//! ```

pub mod error;
mod edits;
mod projects;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Darkroom server API
///
/// Methods are organized into groups:
/// - Project management (create, list, get, delete)
/// - History (append, undo, revert, timeline)
/// - Edits (apply, prompt, quality)
#[derive(Debug, Clone)]
pub struct DarkroomClient {
    /// Base URL of the server (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl DarkroomClient {
    /// Create a new client
    ///
    /// # Example
    /// ```
    /// use darkroom_client::DarkroomClient;
    ///
    /// let client = DarkroomClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Request failed with {}: {}", status, error_text);
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle a response that carries no content (e.g., DELETE operations)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = DarkroomClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = DarkroomClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
