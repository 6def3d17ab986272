use anyhow::Result;
use tracing::warn;

use super::{Command, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_SUCCESS};
use crate::project::{ProjectId, ProjectOrchestratorRouter};

pub struct GetCommand {
    router: ProjectOrchestratorRouter,
    id: String,
    durable: bool,
}

impl GetCommand {
    pub fn new(router: ProjectOrchestratorRouter, id: impl Into<String>) -> Self {
        Self {
            router,
            id: id.into(),
            durable: true,
        }
    }

    /// Mark the registry as process-local, so misses can be explained
    pub fn with_durable_registry(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }
}

/// Shown when a lookup misses an in-memory registry
pub const IN_MEMORY_REGISTRY_NOTE: &str = "the project registry is in-memory and only holds projects created by \
this process; build with the `database` feature and configure [database] to look up earlier projects";

impl Command for GetCommand {
    async fn execute(&self) -> Result<u8> {
        let id: ProjectId = match self.id.parse() {
            Ok(id) => id,
            Err(e) => {
                eprintln!("Invalid project id `{}`: {e}", self.id);
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        match self.router.get_project(&id).await? {
            Some(record) => {
                println!("{}", serde_json::to_string_pretty(&record)?);
                Ok(EXIT_SUCCESS)
            }
            None => {
                eprintln!("Project {id} not found");
                if !self.durable {
                    warn!("In-memory project registry, lookups cannot see earlier runs");
                    eprintln!("Note: {IN_MEMORY_REGISTRY_NOTE}");
                }
                Ok(EXIT_FAILURE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::InMemoryBackends;
    use crate::project::{ProjectConfig, ProjectOrchestrator};

    fn router() -> ProjectOrchestratorRouter {
        ProjectOrchestratorRouter::new(ProjectOrchestrator::in_memory(&InMemoryBackends::new()))
    }

    #[tokio::test]
    async fn test_unknown_project_exits_with_failure() {
        let command = GetCommand::new(router(), ProjectId::new().to_string()).with_durable_registry(false);
        assert_eq!(command.execute().await.unwrap(), EXIT_FAILURE);
    }

    #[tokio::test]
    async fn test_project_created_in_process_is_found() {
        let router = router();
        let state = router.create_project(ProjectConfig::new("Demo")).await.unwrap();

        let command = GetCommand::new(router, state.id().to_string()).with_durable_registry(false);
        assert_eq!(command.execute().await.unwrap(), EXIT_SUCCESS);
    }

    #[tokio::test]
    async fn test_malformed_id_is_a_config_error() {
        let command = GetCommand::new(router(), "not-a-uuid");
        assert_eq!(command.execute().await.unwrap(), EXIT_CONFIG_ERROR);
    }
}
