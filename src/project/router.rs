// Routes creation requests to the orchestrator for the project's type

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::errors::{ClientError, ConfigError};
use super::orchestrator::ProjectOrchestrator;
use super::state::ProjectState;
use super::types::{ProjectConfig, ProjectId, ProjectRecord, DEFAULT_PROJECT_TYPE};
use crate::extensions::Extension;

#[derive(Debug, Clone)]
pub struct ProjectOrchestratorRouter {
    orchestrators: BTreeMap<String, ProjectOrchestrator>,
}

impl ProjectOrchestratorRouter {
    /// Router with `content` as the only project type
    pub fn new(content: ProjectOrchestrator) -> Self {
        let mut orchestrators = BTreeMap::new();
        orchestrators.insert(DEFAULT_PROJECT_TYPE.to_string(), content);
        Self { orchestrators }
    }

    pub fn register_orchestrator(&mut self, project_type: impl Into<String>, orchestrator: ProjectOrchestrator) {
        let project_type = project_type.into();
        info!(project_type = %project_type, "Registered orchestrator");
        self.orchestrators.insert(project_type, orchestrator);
    }

    /// Register with one project type, or with every type when `project_type` is `None`.
    ///
    /// Nothing is registered if any target already has an extension of that name.
    pub fn register_extension(
        &mut self,
        extension: Arc<dyn Extension>,
        project_type: Option<&str>,
    ) -> Result<(), ConfigError> {
        let targets: Vec<String> = match project_type {
            Some(t) => {
                if !self.orchestrators.contains_key(t) {
                    return Err(ConfigError::UnsupportedProjectType {
                        project_type: t.to_string(),
                    });
                }
                vec![t.to_string()]
            }
            None => self.orchestrators.keys().cloned().collect(),
        };

        if targets
            .iter()
            .filter_map(|t| self.orchestrators.get(t))
            .any(|o| o.extension_names().contains(&extension.name()))
        {
            return Err(ConfigError::DuplicateExtension {
                name: extension.name().to_string(),
            });
        }

        for target in &targets {
            if let Some(orchestrator) = self.orchestrators.get_mut(target) {
                orchestrator.register_extension(extension.clone())?;
            }
        }
        Ok(())
    }

    pub fn project_types(&self) -> Vec<&str> {
        self.orchestrators.keys().map(String::as_str).collect()
    }

    pub fn orchestrator(&self, project_type: &str) -> Option<&ProjectOrchestrator> {
        self.orchestrators.get(project_type)
    }

    pub async fn create_project(&self, config: ProjectConfig) -> Result<ProjectState, ConfigError> {
        self.create_project_with(config, Vec::new(), CancellationToken::new())
            .await
    }

    pub async fn create_project_with(
        &self,
        config: ProjectConfig,
        extensions: Vec<Arc<dyn Extension>>,
        cancel: CancellationToken,
    ) -> Result<ProjectState, ConfigError> {
        let Some(orchestrator) = self.orchestrators.get(&config.project_type) else {
            error!(project_type = %config.project_type, "Unsupported project type");
            return Err(ConfigError::UnsupportedProjectType {
                project_type: config.project_type,
            });
        };

        info!(project_type = %config.project_type, "Routing project creation");
        orchestrator
            .create_project_with(config, extensions, cancel)
            .await
    }

    /// Looks the project up through the `content` orchestrator's registry
    pub async fn get_project(&self, id: &ProjectId) -> Result<Option<ProjectRecord>, ClientError> {
        match self.orchestrators.get(DEFAULT_PROJECT_TYPE) {
            Some(orchestrator) => orchestrator.get_project(id).await,
            None => Err(ClientError::permanent("content orchestrator not available")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::InMemoryBackends;
    use crate::project::{ExtensionError, OverallStatus};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Marker;

    #[async_trait]
    impl Extension for Marker {
        fn name(&self) -> &str {
            "marker"
        }

        async fn execute(&self, _state: &mut ProjectState) -> Result<Value, ExtensionError> {
            Ok(json!({"marked": true}))
        }
    }

    fn router() -> (ProjectOrchestratorRouter, InMemoryBackends) {
        let backends = InMemoryBackends::new();
        (
            ProjectOrchestratorRouter::new(ProjectOrchestrator::in_memory(&backends)),
            backends,
        )
    }

    #[tokio::test]
    async fn test_routes_default_type_to_content() {
        let (router, backends) = router();
        let state = router.create_project(ProjectConfig::new("Demo")).await.unwrap();

        assert_eq!(state.overall_status(), Some(OverallStatus::Success));
        let record = router.get_project(state.id()).await.unwrap().unwrap();
        assert_eq!(record.name, "Demo");
        assert!(backends.holds_any(state.id()));
    }

    #[tokio::test]
    async fn test_unknown_type_is_a_config_error() {
        let (router, backends) = router();
        let result = router
            .create_project(ProjectConfig::new("Demo").with_project_type("video"))
            .await;

        assert_eq!(
            result.unwrap_err(),
            ConfigError::UnsupportedProjectType {
                project_type: "video".to_string()
            }
        );
        assert!(backends.journal.is_empty());
    }

    #[test]
    fn test_extension_registers_with_every_type() {
        let (mut router, _) = router();
        let other = InMemoryBackends::new();
        router.register_orchestrator("landing_page", ProjectOrchestrator::in_memory(&other));

        router.register_extension(Arc::new(Marker), None).unwrap();

        for project_type in router.project_types() {
            let orchestrator = router.orchestrator(project_type).unwrap();
            assert_eq!(orchestrator.extension_names(), vec!["marker"]);
        }
    }

    #[test]
    fn test_extension_for_unknown_type_is_rejected() {
        let (mut router, _) = router();
        let err = router
            .register_extension(Arc::new(Marker), Some("video"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedProjectType { .. }));
    }

    #[test]
    fn test_duplicate_registration_leaves_router_unchanged() {
        let (mut router, _) = router();
        let other = InMemoryBackends::new();
        router.register_orchestrator("landing_page", ProjectOrchestrator::in_memory(&other));
        router
            .register_extension(Arc::new(Marker), Some("landing_page"))
            .unwrap();

        let err = router.register_extension(Arc::new(Marker), None).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateExtension { .. }));
        assert!(router.orchestrator("content").unwrap().extension_names().is_empty());
    }
}
