//! Server configuration
//!
//! HTTP bind address, persistence and history settings. The pipeline
//! engine's own settings are read by [`EngineConfig`].

use darkroom_core::domain::project::{DEFAULT_MAX_VERSIONS, MAX_VERSIONS_LIMIT};
use darkroom_engine::EngineConfig;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// Postgres connection string; projects are kept in memory when unset
    pub database_url: Option<String>,

    /// History retention for projects created without an explicit bound
    pub max_versions: usize,

    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            max_versions: DEFAULT_MAX_VERSIONS,
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - DARKROOM_BIND_ADDR (optional, default: 0.0.0.0:8080)
    /// - DATABASE_URL (optional, in-memory projects when unset)
    /// - DARKROOM_MAX_VERSIONS (optional, default: 20)
    /// - everything read by [`EngineConfig::from_env`]
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let bind_addr = std::env::var("DARKROOM_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let max_versions = match std::env::var("DARKROOM_MAX_VERSIONS") {
            Ok(raw) => raw.trim().parse::<usize>().map_err(|_| {
                anyhow::anyhow!("DARKROOM_MAX_VERSIONS must be a positive integer, got '{}'", raw)
            })?,
            Err(_) => defaults.max_versions,
        };

        Ok(Self {
            bind_addr,
            database_url,
            max_versions,
            engine: EngineConfig::from_env()?,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.trim().is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if !(1..=MAX_VERSIONS_LIMIT).contains(&self.max_versions) {
            anyhow::bail!("max_versions must be between 1 and {}", MAX_VERSIONS_LIMIT);
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                anyhow::bail!("DATABASE_URL must be a postgres:// connection string");
            }
        }

        self.engine.validate()
    }
}
