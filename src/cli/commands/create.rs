use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::{exit_code_for, Command, EXIT_CONFIG_ERROR, EXIT_FAILURE};
use crate::project::{ProjectConfig, ProjectOrchestratorRouter, ProjectSettings};
use crate::shutdown::cancel_on_ctrl_c;

pub struct CreateCommand {
    router: ProjectOrchestratorRouter,
    name: String,
    description: Option<String>,
    settings_file: Option<PathBuf>,
    overrides: Vec<String>,
    project_type: Option<String>,
    seo: bool,
}

impl CreateCommand {
    pub fn new(router: ProjectOrchestratorRouter, name: impl Into<String>) -> Self {
        Self {
            router,
            name: name.into(),
            description: None,
            settings_file: None,
            overrides: Vec::new(),
            project_type: None,
            seo: false,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_settings_file(mut self, path: Option<PathBuf>) -> Self {
        self.settings_file = path;
        self
    }

    pub fn with_overrides(mut self, overrides: Vec<String>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_project_type(mut self, project_type: Option<String>) -> Self {
        self.project_type = project_type;
        self
    }

    pub fn with_seo(mut self, seo: bool) -> Self {
        self.seo = seo;
        self
    }

    /// Assemble the project config from the command line inputs
    pub fn build_config(&self) -> Result<ProjectConfig> {
        let mut config = ProjectConfig::new(self.name.clone());

        if let Some(description) = &self.description {
            let description: Value =
                serde_json::from_str(description).context("--description is not valid JSON")?;
            config = config.with_description(description);
        }

        if let Some(path) = &self.settings_file {
            config = config.with_settings(read_settings(path)?);
        }

        for entry in &self.overrides {
            let (key, value) = parse_override(entry)?;
            config.settings.set(&key, value);
        }

        if self.seo {
            config.settings.set("seo_enabled", Value::Bool(true));
        }

        if let Some(project_type) = &self.project_type {
            config = config.with_project_type(project_type.clone());
        }

        Ok(config)
    }
}

fn read_settings(path: &Path) -> Result<ProjectSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;

    let settings = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?,
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
    };
    Ok(settings)
}

/// `key=value`, where a value that is not valid JSON is taken as a string
fn parse_override(entry: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = entry.split_once('=') else {
        bail!("--set expects KEY=VALUE, got `{entry}`");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("--set has an empty key in `{entry}`");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

impl Command for CreateCommand {
    async fn execute(&self) -> Result<u8> {
        let config = match self.build_config() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Configuration error: {e:#}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        let cancel = CancellationToken::new();
        let listener = cancel_on_ctrl_c(cancel.clone());
        let result = self
            .router
            .create_project_with(config, Vec::new(), cancel)
            .await;
        listener.abort();

        let state = match result {
            Ok(state) => state,
            Err(e) => {
                eprintln!("Configuration error: {e}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        println!("{}", serde_json::to_string_pretty(&state)?);

        Ok(state.overall_status().map(exit_code_for).unwrap_or(EXIT_FAILURE))
    }
}
