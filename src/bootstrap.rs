//! Wiring of configured backends into a ready router

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::OrchestratorConfig;
use crate::extensions::SeoExtension;
use crate::external::{
    CallJournal, ChromaVectorStore, InMemoryRelationalStore, InMemorySeoBootstrapper,
    InMemoryTemplateStore, InMemoryVectorStore, ProjectRegistry, RelationalStore, RetryPolicy,
    VectorStore,
};
use crate::project::{ProjectOrchestrator, ProjectOrchestratorRouter};

/// Build the router for `config`.
///
/// Backends without configuration fall back to their in-memory versions, so
/// a bare config yields a fully offline orchestrator.
pub async fn initialize_project_management(config: &OrchestratorConfig) -> Result<ProjectOrchestratorRouter> {
    let retry = RetryPolicy::new(config.retry.clone());
    let journal = CallJournal::new();

    let (relational, registry) = relational_store(config, &retry, &journal).await?;

    let vectors: Arc<dyn VectorStore> = match &config.vector_store {
        Some(vector_config) => {
            info!(base_url = %vector_config.base_url, "Using Chroma vector store");
            Arc::new(ChromaVectorStore::new(vector_config, retry.clone())?)
        }
        None => {
            info!("Using in-memory vector store");
            Arc::new(InMemoryVectorStore::new(journal.clone()))
        }
    };

    let templates = Arc::new(InMemoryTemplateStore::new(journal));

    let mut orchestrator = ProjectOrchestrator::new(relational, vectors, templates).with_registry(registry);

    if config.extensions.seo.enabled {
        orchestrator.register_extension(Arc::new(SeoExtension::with_config(
            Arc::new(InMemorySeoBootstrapper::new()),
            config.extensions.seo.extension_config(),
        )))?;
    }

    Ok(ProjectOrchestratorRouter::new(orchestrator))
}

#[cfg(feature = "database")]
async fn relational_store(
    config: &OrchestratorConfig,
    retry: &RetryPolicy,
    journal: &CallJournal,
) -> Result<(Arc<dyn RelationalStore>, Arc<dyn ProjectRegistry>)> {
    use crate::external::PostgresRelationalStore;

    if let Some(database) = &config.database {
        info!("Using PostgreSQL relational store");
        let store = Arc::new(PostgresRelationalStore::connect(database, retry.clone()).await?);
        let relational: Arc<dyn RelationalStore> = store.clone();
        let registry: Arc<dyn ProjectRegistry> = store;
        return Ok((relational, registry));
    }

    Ok(in_memory_relational(journal))
}

#[cfg(not(feature = "database"))]
async fn relational_store(
    config: &OrchestratorConfig,
    _retry: &RetryPolicy,
    journal: &CallJournal,
) -> Result<(Arc<dyn RelationalStore>, Arc<dyn ProjectRegistry>)> {
    if config.database.is_some() {
        tracing::warn!("Database configured but built without the `database` feature, using in-memory store");
    }
    Ok(in_memory_relational(journal))
}

/// Whether projects outlive the process: only a PostgreSQL registry does
pub fn has_durable_registry(config: &OrchestratorConfig) -> bool {
    cfg!(feature = "database") && config.database.is_some()
}

fn in_memory_relational(journal: &CallJournal) -> (Arc<dyn RelationalStore>, Arc<dyn ProjectRegistry>) {
    info!("Using in-memory relational store");
    let store = Arc::new(InMemoryRelationalStore::new(journal.clone()));
    let relational: Arc<dyn RelationalStore> = store.clone();
    let registry: Arc<dyn ProjectRegistry> = store;
    (relational, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{OverallStatus, ProjectConfig};

    #[tokio::test]
    async fn test_default_config_builds_offline_router() {
        let router = initialize_project_management(&OrchestratorConfig::default())
            .await
            .unwrap();

        let content = router.orchestrator("content").unwrap();
        assert_eq!(content.extension_names(), vec!["seo"]);

        let state = router
            .create_project(ProjectConfig::new("Demo").with_setting("seo_enabled", true))
            .await
            .unwrap();
        assert_eq!(state.overall_status(), Some(OverallStatus::Success));
        assert!(router.get_project(state.id()).await.unwrap().is_some());
    }

    #[test]
    fn test_registry_is_durable_only_with_database() {
        assert!(!has_durable_registry(&OrchestratorConfig::default()));

        let mut config = OrchestratorConfig::default();
        config.database = Some(crate::config::DatabaseConfig {
            url: "postgres://localhost/projects".to_string(),
            max_connections: 5,
            acquire_timeout_seconds: 5,
        });
        assert_eq!(has_durable_registry(&config), cfg!(feature = "database"));
    }

    #[tokio::test]
    async fn test_seo_can_be_disabled() {
        let mut config = OrchestratorConfig::default();
        config.extensions.seo.enabled = false;

        let router = initialize_project_management(&config).await.unwrap();
        assert!(router.orchestrator("content").unwrap().extension_names().is_empty());
    }
}
