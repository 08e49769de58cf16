//! Engine configuration
//!
//! Defines the parameters of the pipeline engine: which container runtime
//! to drive, where to stage artifacts, stage and classifier timeouts, and
//! where the external image store lives.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 180;
const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DILATE_RADIUS: u32 = 15;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Container runtime binary ("docker" or "podman")
    pub runtime: String,

    /// Local directory for staged artifacts
    pub staging_dir: PathBuf,

    /// Directory inside execution units for per-request files
    pub unit_work_dir: String,

    /// Upper bound for one in-unit command
    pub stage_timeout: Duration,

    /// Classifier base URL; no classifier when unset
    pub classifier_url: Option<String>,

    /// Bearer key for the classifier
    pub classifier_api_key: Option<String>,

    /// Upper bound for one classifier call
    pub classifier_timeout: Duration,

    /// Directory backing the image store
    pub store_dir: PathBuf,

    /// Public base URL the store's images are served under
    pub store_url: String,

    /// Optional JSON file overriding unit names and images
    pub units_file: Option<PathBuf>,

    /// Mask dilation radius used by object removal, in pixels
    pub dilate_radius: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let base = std::env::temp_dir();
        Self {
            runtime: "docker".to_string(),
            staging_dir: base.join("darkroom-staging"),
            unit_work_dir: "/tmp".to_string(),
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            classifier_url: None,
            classifier_api_key: None,
            classifier_timeout: Duration::from_secs(DEFAULT_CLASSIFIER_TIMEOUT_SECS),
            store_dir: base.join("darkroom-store"),
            store_url: "http://localhost:8080/images".to_string(),
            units_file: None,
            dilate_radius: DEFAULT_DILATE_RADIUS,
        }
    }
}

impl EngineConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - DARKROOM_RUNTIME (default: docker)
    /// - DARKROOM_STAGING_DIR (default: $TMPDIR/darkroom-staging)
    /// - DARKROOM_UNIT_WORK_DIR (default: /tmp)
    /// - DARKROOM_STAGE_TIMEOUT (seconds, default: 180)
    /// - DARKROOM_CLASSIFIER_URL
    /// - DARKROOM_CLASSIFIER_API_KEY
    /// - DARKROOM_CLASSIFIER_TIMEOUT (seconds, default: 10)
    /// - DARKROOM_STORE_DIR (default: $TMPDIR/darkroom-store)
    /// - DARKROOM_STORE_URL (default: http://localhost:8080/images)
    /// - DARKROOM_UNITS_FILE
    /// - DARKROOM_DILATE_RADIUS (pixels, default: 15)
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Builds configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str, default: Duration| {
            non_empty(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            runtime: non_empty("DARKROOM_RUNTIME").unwrap_or(defaults.runtime),
            staging_dir: non_empty("DARKROOM_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            unit_work_dir: non_empty("DARKROOM_UNIT_WORK_DIR").unwrap_or(defaults.unit_work_dir),
            stage_timeout: secs("DARKROOM_STAGE_TIMEOUT", defaults.stage_timeout),
            classifier_url: non_empty("DARKROOM_CLASSIFIER_URL"),
            classifier_api_key: non_empty("DARKROOM_CLASSIFIER_API_KEY"),
            classifier_timeout: secs("DARKROOM_CLASSIFIER_TIMEOUT", defaults.classifier_timeout),
            store_dir: non_empty("DARKROOM_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
            store_url: non_empty("DARKROOM_STORE_URL").unwrap_or(defaults.store_url),
            units_file: non_empty("DARKROOM_UNITS_FILE").map(PathBuf::from),
            dilate_radius: non_empty("DARKROOM_DILATE_RADIUS")
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(defaults.dilate_radius),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runtime.trim().is_empty() {
            anyhow::bail!("runtime cannot be empty");
        }

        if self.stage_timeout.is_zero() {
            anyhow::bail!("stage_timeout must be greater than 0");
        }

        if self.classifier_timeout.is_zero() {
            anyhow::bail!("classifier_timeout must be greater than 0");
        }

        if !self.unit_work_dir.starts_with('/') {
            anyhow::bail!("unit_work_dir must be an absolute path");
        }

        if let Some(url) = &self.classifier_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("classifier_url must start with http:// or https://");
            }
        }

        if !self.store_url.starts_with("http://") && !self.store_url.starts_with("https://") {
            anyhow::bail!("store_url must start with http:// or https://");
        }

        if self.dilate_radius == 0 {
            anyhow::bail!("dilate_radius must be greater than 0");
        }

        Ok(())
    }
}
