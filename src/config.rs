use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::extensions::seo::{SeoConfig, DEFAULT_LOCATION};
use crate::external::RetryConfig;

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "project-orchestrator.toml";

/// Prefix of environment overrides, e.g. `PROJECT_ORCHESTRATOR__RETRY__MAX_ATTEMPTS`
pub const ENV_PREFIX: &str = "PROJECT_ORCHESTRATOR";

const ENV_SEPARATOR: &str = "__";

/// Main configuration structure for the project orchestrator
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// PostgreSQL settings; in-memory store when absent
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// Chroma settings; in-memory store when absent
    #[serde(default)]
    pub vector_store: Option<VectorStoreConfig>,
    /// Retry policy applied inside the backend clients
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub extensions: ExtensionsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    /// Base URL of the Chroma server, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_burst() -> u32 {
    20
}

impl VectorStoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: default_timeout_ms(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    pub seo: SeoSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SeoSection {
    /// Register the SEO extension; projects still opt in via `seo_enabled`
    pub enabled: bool,
    pub default_location: String,
}

impl Default for SeoSection {
    fn default() -> Self {
        Self {
            enabled: true,
            default_location: DEFAULT_LOCATION.to_string(),
        }
    }
}

impl SeoSection {
    pub fn extension_config(&self) -> SeoConfig {
        SeoConfig {
            default_location: self.default_location.clone(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `project-orchestrator.toml` in the working directory, if present
    /// 3. Environment variables (`PROJECT_ORCHESTRATOR__SECTION__KEY`)
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`load`](Self::load), but an explicit `path` must exist
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        Self::build(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
    }

    fn build(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Self::default()).context("Failed to seed default configuration")?);

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
                }
            }
        }

        let config = builder
            .add_source(environment)
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
