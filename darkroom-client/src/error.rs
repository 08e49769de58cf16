//! Error types for the Darkroom client

use serde::Deserialize;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the Darkroom client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        status: u16,
        message: String,
        /// Pipeline stage that failed, when the server reports one
        stage: Option<String>,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    stage: Option<String>,
}

impl ClientError {
    /// Build an API error from a status code and the raw response body
    ///
    /// Bodies shaped like `{"error": ..., "stage": ...}` are unpacked;
    /// anything else is kept verbatim.
    pub fn api_error(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => Self::ApiError {
                status,
                message: parsed.error,
                stage: parsed.stage,
            },
            Err(_) => Self::ApiError {
                status,
                message: body,
                stage: None,
            },
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if the classifier quota ran out
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::ApiError { status: 429, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server or upstream error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }

    /// Failed pipeline stage, if any
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::ApiError { stage, .. } => stage.as_deref(),
            _ => None,
        }
    }
}
