//! Classifier adapter
//!
//! Black-box access to the external classification service: image
//! subject classification, quality analysis and free-text intent routing.
//! Pipelines only consult it to pick a model variant and never fail
//! because of it.

use async_trait::async_trait;
use base64::Engine as _;
use darkroom_core::domain::intent::ModelVariant;
use darkroom_core::dto::edit::{QualityReport, VariantSource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Subject classification of an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// "human" or "object"
    pub label: String,
    pub confidence: f32,
}

/// Structured intent extracted from a free-text instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRoute {
    pub feature: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default = "default_supported")]
    pub supported: bool,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_supported() -> bool {
    true
}

/// Classifier failures
#[derive(Debug, Clone, Error)]
pub enum ClassifierError {
    #[error("Classifier quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Classifier credentials are not configured")]
    MissingCredentials,

    #[error("Classifier request failed: {0}")]
    Transport(String),

    #[error("Classifier returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),
}

/// External classification service
#[async_trait]
pub trait ClassifierAdapter: Send + Sync {
    /// Classifies the main subject of an image
    async fn classify(&self, image: &[u8], mime: &str) -> Result<Classification, ClassifierError>;

    /// Reports which enhancements an image needs
    async fn analyze_quality(&self, image: &[u8]) -> Result<QualityReport, ClassifierError>;

    /// Maps a free-text instruction to a feature and parameters
    async fn route_intent(
        &self,
        image: Option<&[u8]>,
        text: &str,
    ) -> Result<IntentRoute, ClassifierError>;
}

/// Picks the segmentation model variant for an image
///
/// An explicit choice always wins. Otherwise the classifier decides, and
/// any classifier failure or timeout falls back to the general model.
pub async fn select_variant(
    classifier: &dyn ClassifierAdapter,
    image: &[u8],
    mime: &str,
    explicit: Option<ModelVariant>,
    timeout: Duration,
) -> (ModelVariant, VariantSource) {
    if let Some(variant) = explicit {
        debug!("Using caller supplied model variant: {}", variant);
        return (variant, VariantSource::Explicit);
    }

    match tokio::time::timeout(timeout, classifier.classify(image, mime)).await {
        Ok(Ok(classification)) => {
            let variant = if classification.label.eq_ignore_ascii_case("human") {
                ModelVariant::Human
            } else {
                ModelVariant::General
            };
            info!(
                "Classifier labelled image '{}' ({:.2}), using {} model",
                classification.label, classification.confidence, variant
            );
            (variant, VariantSource::Classifier)
        }
        Ok(Err(e)) => {
            warn!("Classification failed, falling back to general model: {}", e);
            (ModelVariant::General, VariantSource::Fallback)
        }
        Err(_) => {
            warn!(
                "Classification timed out after {:?}, falling back to general model",
                timeout
            );
            (ModelVariant::General, VariantSource::Fallback)
        }
    }
}

/// Guesses a MIME type from a file extension
pub fn mime_for(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Classifier used when no service is configured
///
/// Every call fails with [`ClassifierError::MissingCredentials`], so
/// pipelines take their fallback paths.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredClassifier;

#[async_trait]
impl ClassifierAdapter for UnconfiguredClassifier {
    async fn classify(&self, _image: &[u8], _mime: &str) -> Result<Classification, ClassifierError> {
        Err(ClassifierError::MissingCredentials)
    }

    async fn analyze_quality(&self, _image: &[u8]) -> Result<QualityReport, ClassifierError> {
        Err(ClassifierError::MissingCredentials)
    }

    async fn route_intent(
        &self,
        _image: Option<&[u8]>,
        _text: &str,
    ) -> Result<IntentRoute, ClassifierError> {
        Err(ClassifierError::MissingCredentials)
    }
}

/// JSON-over-HTTP classifier client
///
/// Endpoints: `POST {base}/classify`, `POST {base}/quality` and
/// `POST {base}/route`. Images travel base64 encoded.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    image: String,
    mime_type: &'a str,
}

#[derive(Serialize)]
struct QualityRequest {
    image: String,
}

#[derive(Serialize)]
struct RouteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    text: &'a str,
}

impl HttpClassifier {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(base_url, api_key, reqwest::Client::new())
    }

    pub fn with_client(
        base_url: impl Into<String>,
        api_key: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClassifierError>
    where
        B: Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ClassifierError::MissingCredentials)?;

        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let message = response.text().await.unwrap_or_default();
            return Err(ClassifierError::QuotaExceeded(message));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ClassifierError::MissingCredentials);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Transport(format!(
                "status {}: {}",
                status.as_u16(),
                message
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))
    }
}

fn encode(image: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(image)
}

#[async_trait]
impl ClassifierAdapter for HttpClassifier {
    async fn classify(&self, image: &[u8], mime: &str) -> Result<Classification, ClassifierError> {
        self.post(
            "classify",
            &ClassifyRequest {
                image: encode(image),
                mime_type: mime,
            },
        )
        .await
    }

    async fn analyze_quality(&self, image: &[u8]) -> Result<QualityReport, ClassifierError> {
        self.post(
            "quality",
            &QualityRequest {
                image: encode(image),
            },
        )
        .await
    }

    async fn route_intent(
        &self,
        image: Option<&[u8]>,
        text: &str,
    ) -> Result<IntentRoute, ClassifierError> {
        self.post(
            "route",
            &RouteRequest {
                image: image.map(encode),
                text,
            },
        )
        .await
    }
}
