//! SEO bootstrap extension
//!
//! Prepares the SEO module for a new project when the project asks for it.
//! Keyword research itself lives behind [`SeoBootstrapper`]; this extension
//! only resolves inputs, drives the collaborator, and reports what happened.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use super::Extension;
use crate::project::{ClientError, ExtensionError, ProjectId, ProjectState};

pub const SEO_EXTENSION_NAME: &str = "seo";

/// Location used when neither settings nor configuration name one
pub const DEFAULT_LOCATION: &str = "United States";

/// Inputs resolved from project settings for one SEO initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoRequest {
    pub language: String,
    pub location: String,
    pub seed_topics: Vec<String>,
}

/// Result of an initial keyword sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainSummary {
    pub keywords: Vec<String>,
    pub opportunities: Vec<String>,
}

/// The SEO subsystem as seen from project creation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SeoBootstrapper: Send + Sync {
    async fn initialize(&self, project_id: &ProjectId, request: &SeoRequest) -> Result<(), ClientError>;

    async fn bootstrap_terrain(
        &self,
        project_id: &ProjectId,
        request: &SeoRequest,
    ) -> Result<TerrainSummary, ClientError>;

    async fn is_initialized(&self, project_id: &ProjectId) -> Result<bool, ClientError>;

    async fn teardown(&self, project_id: &ProjectId) -> Result<(), ClientError>;
}

/// Extension-level defaults, from the `extensions.seo` configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoConfig {
    #[serde(default = "default_location")]
    pub default_location: String,
}

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

impl Default for SeoConfig {
    fn default() -> Self {
        Self {
            default_location: default_location(),
        }
    }
}

pub struct SeoExtension {
    bootstrapper: Arc<dyn SeoBootstrapper>,
    config: SeoConfig,
}

impl SeoExtension {
    pub fn new(bootstrapper: Arc<dyn SeoBootstrapper>) -> Self {
        Self::with_config(bootstrapper, SeoConfig::default())
    }

    pub fn with_config(bootstrapper: Arc<dyn SeoBootstrapper>, config: SeoConfig) -> Self {
        Self {
            bootstrapper,
            config,
        }
    }

    /// Seed topics fall back from `seed_topics` to `main_topic` to the project name
    fn resolve_request(&self, state: &ProjectState) -> SeoRequest {
        let config = state.config();
        let settings = &config.settings;

        let mut seed_topics = settings.get_strings("seed_topics");
        if seed_topics.is_empty() {
            if let Some(topic) = settings.get_str("main_topic") {
                seed_topics.push(topic.to_string());
            }
        }
        if seed_topics.is_empty() {
            warn!(project.id = %state.id(), "No seed topics configured, using project name");
            seed_topics.push(config.name.clone());
        }

        SeoRequest {
            language: settings.language().to_string(),
            location: settings
                .get_str("location")
                .unwrap_or(&self.config.default_location)
                .to_string(),
            seed_topics,
        }
    }

    /// Undo `initialize` after a later step failed, so the failed extension
    /// leaves nothing behind
    async fn abandon(&self, project_id: &ProjectId, error: ClientError) -> ExtensionError {
        match self.bootstrapper.teardown(project_id).await {
            Ok(()) => {
                warn!(project.id = %project_id, error = %error, "SEO bootstrap failed, module torn down");
                ExtensionError::Client(error)
            }
            Err(teardown) => {
                warn!(
                    project.id = %project_id,
                    error = %error,
                    teardown_error = %teardown,
                    "SEO bootstrap failed and teardown failed, module may be orphaned"
                );
                ExtensionError::execution(format!(
                    "{error}; teardown after failed bootstrap also failed: {teardown}"
                ))
            }
        }
    }

    fn was_skipped(state: &ProjectState) -> bool {
        state
            .extension_data(SEO_EXTENSION_NAME)
            .and_then(|v| v.get("status"))
            .and_then(Value::as_str)
            == Some("skipped")
    }
}

#[async_trait]
impl Extension for SeoExtension {
    fn name(&self) -> &str {
        SEO_EXTENSION_NAME
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn requires_validation(&self) -> bool {
        true
    }

    async fn execute(&self, state: &mut ProjectState) -> Result<Value, ExtensionError> {
        if !state.config().settings.flag("seo_enabled") {
            info!(project.id = %state.id(), "SEO initialization skipped, not enabled in settings");
            let output = json!({"status": "skipped", "reason": "not_enabled"});
            state.set_extension_data(SEO_EXTENSION_NAME, output.clone());
            return Ok(output);
        }

        let request = self.resolve_request(state);
        let project_id = *state.id();

        self.bootstrapper.initialize(&project_id, &request).await?;

        let output = if state.config().settings.flag("bootstrap_seo_terrain") {
            let terrain = match self.bootstrapper.bootstrap_terrain(&project_id, &request).await {
                Ok(terrain) => terrain,
                Err(e) => return Err(self.abandon(&project_id, e).await),
            };
            info!(
                project.id = %project_id,
                seed_topics = request.seed_topics.len(),
                keywords = terrain.keywords.len(),
                "SEO terrain bootstrapped"
            );
            json!({
                "status": "completed",
                "terrain_bootstrapped": true,
                "keywords_found": terrain.keywords.len(),
                "opportunities_found": terrain.opportunities.len(),
            })
        } else {
            info!(project.id = %project_id, "SEO module initialized, terrain bootstrap skipped");
            json!({"status": "completed", "terrain_bootstrapped": false})
        };

        state.set_extension_data(
            SEO_EXTENSION_NAME,
            json!({
                "status": "completed",
                "language": request.language,
                "location": request.location,
                "seed_topics": request.seed_topics,
            }),
        );

        Ok(output)
    }

    async fn validate(&self, state: &ProjectState) -> Result<(), ExtensionError> {
        if Self::was_skipped(state) {
            return Ok(());
        }

        if self.bootstrapper.is_initialized(state.id()).await? {
            Ok(())
        } else {
            Err(ExtensionError::validation(format!(
                "SEO module not initialized for project {}",
                state.id()
            )))
        }
    }

    async fn compensate(&self, state: &ProjectState) -> Result<(), ExtensionError> {
        if Self::was_skipped(state) {
            return Ok(());
        }
        self.bootstrapper.teardown(state.id()).await?;
        Ok(())
    }
}
