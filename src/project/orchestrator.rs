//! Multi-phase project creation with reverse-order compensation

use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use super::errors::{ClientError, ConfigError, ProjectError, TransitionError};
use super::state::ProjectState;
use super::types::{
    Backend, CleanupRecord, ExtensionOutcome, ExtensionStatus, OverallStatus, Phase, ProjectConfig,
    ProjectId, ProjectRecord, Resource, ResourceHandle,
};
use crate::extensions::{Extension, ExtensionRegistry};
use crate::external::{InMemoryBackends, ProjectRegistry, RelationalStore, TemplateStore, VectorStore};
use crate::telemetry::project_creation_span;

/// Marks a fatal stop at `phase`; the details are already in the state
#[derive(Debug, Clone, Copy)]
struct Fatal {
    phase: Phase,
}

/// Something created during this call that compensation must undo
enum Created {
    Backend(Backend),
    Extension(Arc<dyn Extension>),
}

impl Created {
    fn resource(&self) -> Resource {
        match self {
            Created::Backend(backend) => Resource::Backend(*backend),
            Created::Extension(extension) => Resource::Extension(extension.name().to_string()),
        }
    }
}

/// Run `future` unless `cancel` fires first. Cancellation wins ties.
async fn guarded<T>(cancel: &CancellationToken, future: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

/// The orchestrator only issues legal transitions; a rejection is a bug worth shouting about
fn log_rejected(result: Result<(), TransitionError>) {
    if let Err(e) = result {
        error!(error = %e, "Project state rejected a transition");
    }
}

/// Drives project creation across the three backends and the extensions
#[derive(Clone)]
pub struct ProjectOrchestrator {
    relational: Arc<dyn RelationalStore>,
    vectors: Arc<dyn VectorStore>,
    templates: Arc<dyn TemplateStore>,
    registry: Option<Arc<dyn ProjectRegistry>>,
    extensions: ExtensionRegistry,
}

impl ProjectOrchestrator {
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        vectors: Arc<dyn VectorStore>,
        templates: Arc<dyn TemplateStore>,
    ) -> Self {
        Self {
            relational,
            vectors,
            templates,
            registry: None,
            extensions: ExtensionRegistry::new(),
        }
    }

    /// Orchestrator over in-memory stores, with the relational store as registry
    pub fn in_memory(backends: &InMemoryBackends) -> Self {
        Self::new(
            backends.relational.clone(),
            backends.vectors.clone(),
            backends.templates.clone(),
        )
        .with_registry(backends.relational.clone())
    }

    pub fn with_registry(mut self, registry: Arc<dyn ProjectRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_extension(mut self, extension: Arc<dyn Extension>) -> Result<Self, ConfigError> {
        self.register_extension(extension)?;
        Ok(self)
    }

    /// Extensions run in registration order
    pub fn register_extension(&mut self, extension: Arc<dyn Extension>) -> Result<(), ConfigError> {
        info!(extension = extension.name(), "Registering extension");
        self.extensions.register(extension)
    }

    pub fn extension_names(&self) -> Vec<&str> {
        self.extensions.names()
    }

    /// Create a project with the registered extensions.
    ///
    /// Only a bad config is returned as `Err`. Every backend or extension
    /// failure is recorded in the returned state.
    pub async fn create_project(&self, config: ProjectConfig) -> Result<ProjectState, ConfigError> {
        self.create_project_with(config, Vec::new(), CancellationToken::new())
            .await
    }

    /// Create a project with extra per-call extensions, run after the
    /// registered ones, and a token that aborts the creation
    pub async fn create_project_with(
        &self,
        config: ProjectConfig,
        extensions: Vec<Arc<dyn Extension>>,
        cancel: CancellationToken,
    ) -> Result<ProjectState, ConfigError> {
        config.validate()?;
        let extensions = self.extensions.merged(extensions)?;

        let mut state = ProjectState::new(config);
        let span = project_creation_span(state.id(), &state.config().name);
        self.run(&mut state, &extensions, &cancel)
            .instrument(span)
            .await;

        Ok(state)
    }

    /// Durable registry record for `id`, `None` when unknown
    pub async fn get_project(&self, id: &ProjectId) -> Result<Option<ProjectRecord>, ClientError> {
        match &self.registry {
            Some(registry) => registry.get(id).await,
            None => Err(ClientError::permanent("no project registry configured")),
        }
    }

    async fn run(
        &self,
        state: &mut ProjectState,
        extensions: &[Arc<dyn Extension>],
        cancel: &CancellationToken,
    ) {
        info!(extensions = extensions.len(), "Starting project creation");

        let mut created = Vec::new();
        let status = match self.run_phases(state, extensions, cancel, &mut created).await {
            Ok(false) => OverallStatus::Success,
            Ok(true) => OverallStatus::PartialSuccess,
            Err(fatal) => {
                warn!(phase = %fatal.phase, "Fatal failure, compensating");
                if self.compensate(state, created, fatal).await {
                    OverallStatus::Failure
                } else {
                    OverallStatus::PartialFailure
                }
            }
        };

        log_rejected(state.finish(status));
        info!(status = %status, errors = state.errors().len(), "Project creation finished");
    }

    /// Returns whether a non-critical extension failed
    async fn run_phases(
        &self,
        state: &mut ProjectState,
        extensions: &[Arc<dyn Extension>],
        cancel: &CancellationToken,
        created: &mut Vec<Created>,
    ) -> Result<bool, Fatal> {
        for backend in Backend::ALL {
            self.provision(state, backend, cancel).await?;
            created.push(Created::Backend(backend));
        }

        let (degraded, executed) = self.run_extensions(state, extensions, cancel, created).await?;
        self.validate_project(state, &executed, cancel).await?;

        Ok(degraded)
    }

    async fn provision(
        &self,
        state: &mut ProjectState,
        backend: Backend,
        cancel: &CancellationToken,
    ) -> Result<(), Fatal> {
        let phase = backend.phase();
        log_rejected(state.begin(phase));
        info!(phase = %phase, "Phase started");

        let id = *state.id();
        let result = guarded(cancel, self.create_backend(backend, &id, state.config())).await;

        match result {
            Some(Ok(handle)) => {
                log_rejected(state.complete_with(handle));
                info!(phase = %phase, "Phase completed");
                Ok(())
            }
            Some(Err(e)) => {
                error!(phase = %phase, error = %e, class = %e.class(), "Backend creation failed");
                let error = ProjectError::ResourceCreate {
                    resource: Resource::Backend(backend),
                    class: e.class(),
                    message: e.to_string(),
                };
                log_rejected(state.fail(phase, error));
                Err(Fatal { phase })
            }
            None => Err(self.cancelled(state, phase)),
        }
    }

    /// Returns whether any extension degraded the project, and the extensions
    /// that executed successfully
    async fn run_extensions(
        &self,
        state: &mut ProjectState,
        extensions: &[Arc<dyn Extension>],
        cancel: &CancellationToken,
        created: &mut Vec<Created>,
    ) -> Result<(bool, Vec<Arc<dyn Extension>>), Fatal> {
        let phase = Phase::Extensions;
        log_rejected(state.begin(phase));

        let mut degraded = false;
        let mut executed = Vec::new();

        for extension in extensions {
            let name = extension.name().to_string();
            let critical = extension.is_critical();
            info!(extension = %name, critical, "Executing extension");

            match guarded(cancel, extension.execute(state)).await {
                Some(Ok(output)) => {
                    state.record_extension(ExtensionOutcome {
                        name,
                        critical,
                        status: ExtensionStatus::Completed,
                        output: Some(output),
                        error: None,
                    });
                    created.push(Created::Extension(extension.clone()));
                    executed.push(extension.clone());
                }
                Some(Err(e)) => {
                    state.record_extension(ExtensionOutcome {
                        name: name.clone(),
                        critical,
                        status: ExtensionStatus::Failed,
                        output: None,
                        error: Some(e.to_string()),
                    });
                    let error = ProjectError::ResourceCreate {
                        resource: Resource::Extension(name.clone()),
                        class: e.class(),
                        message: e.to_string(),
                    };

                    if critical {
                        error!(extension = %name, error = %e, "Critical extension failed");
                        log_rejected(state.fail(phase, error));
                        return Err(Fatal { phase });
                    }

                    warn!(extension = %name, error = %e, "Non-critical extension failed, continuing");
                    state.record_error(phase, error);
                    degraded = true;
                }
                None => return Err(self.cancelled(state, phase)),
            }
        }

        log_rejected(state.complete(phase));
        Ok((degraded, executed))
    }

    /// Collect every validation failure before deciding
    async fn validate_project(
        &self,
        state: &mut ProjectState,
        executed: &[Arc<dyn Extension>],
        cancel: &CancellationToken,
    ) -> Result<(), Fatal> {
        let phase = Phase::Validation;
        log_rejected(state.begin(phase));

        let id = *state.id();
        let mut failures = Vec::new();

        for backend in Backend::ALL {
            match guarded(cancel, self.validate_backend(backend, &id)).await {
                Some(Ok(())) => {}
                Some(Err(e)) => failures.push(ProjectError::ResourceValidate {
                    resource: Resource::Backend(backend),
                    message: e.to_string(),
                }),
                None => return Err(self.cancelled_validation(state, failures)),
            }
        }

        for extension in executed.iter().filter(|e| e.requires_validation()) {
            match guarded(cancel, extension.validate(state)).await {
                Some(Ok(())) => {}
                Some(Err(e)) => failures.push(ProjectError::ResourceValidate {
                    resource: Resource::Extension(extension.name().to_string()),
                    message: e.to_string(),
                }),
                None => return Err(self.cancelled_validation(state, failures)),
            }
        }

        let Some(last) = failures.pop() else {
            log_rejected(state.complete(phase));
            info!("Project validated");
            return Ok(());
        };

        error!(failures = failures.len() + 1, "Project validation failed");
        for failure in failures {
            state.record_error(phase, failure);
        }
        log_rejected(state.fail(phase, last));
        Err(Fatal { phase })
    }

    /// Undo everything in `created`, newest first. Not cancellable.
    ///
    /// Returns true when every step succeeded.
    async fn compensate(&self, state: &mut ProjectState, created: Vec<Created>, fatal: Fatal) -> bool {
        let id = *state.id();
        let mut clean = true;

        for item in created.into_iter().rev() {
            let resource = item.resource();
            let result = match &item {
                Created::Backend(backend) => self
                    .delete_backend(*backend, &id)
                    .await
                    .map_err(|e| e.to_string()),
                Created::Extension(extension) => extension
                    .compensate(state)
                    .await
                    .map_err(|e| e.to_string()),
            };

            match result {
                Ok(()) => {
                    info!(resource = %resource, "Compensated");
                    state.record_cleanup(CleanupRecord {
                        resource,
                        removed: true,
                        error: None,
                    });
                }
                Err(message) => {
                    error!(resource = %resource, error = %message, "Compensation failed, resource may be orphaned");
                    clean = false;
                    state.record_error(
                        fatal.phase,
                        ProjectError::Cleanup {
                            resource: resource.clone(),
                            message: message.clone(),
                        },
                    );
                    state.record_cleanup(CleanupRecord {
                        resource,
                        removed: false,
                        error: Some(message),
                    });
                }
            }
        }

        clean
    }

    fn cancelled(&self, state: &mut ProjectState, phase: Phase) -> Fatal {
        warn!(phase = %phase, "Project creation cancelled");
        log_rejected(state.fail(phase, ProjectError::Cancelled { phase }));
        Fatal { phase }
    }

    /// Cancelled mid-validation; failures found so far are kept ahead of the cancellation
    fn cancelled_validation(&self, state: &mut ProjectState, failures: Vec<ProjectError>) -> Fatal {
        for failure in failures {
            state.record_error(Phase::Validation, failure);
        }
        self.cancelled(state, Phase::Validation)
    }

    async fn create_backend(
        &self,
        backend: Backend,
        id: &ProjectId,
        config: &ProjectConfig,
    ) -> Result<ResourceHandle, ClientError> {
        match backend {
            Backend::Database => self.relational.create(id, config).await.map(ResourceHandle::Schema),
            Backend::VectorStore => self.vectors.create(id, config).await.map(ResourceHandle::Collection),
            Backend::Templates => self.templates.create(id, config).await.map(ResourceHandle::Templates),
        }
    }

    async fn delete_backend(&self, backend: Backend, id: &ProjectId) -> Result<(), ClientError> {
        match backend {
            Backend::Database => self.relational.delete(id).await,
            Backend::VectorStore => self.vectors.delete(id).await,
            Backend::Templates => self.templates.delete(id).await,
        }
    }

    async fn validate_backend(&self, backend: Backend, id: &ProjectId) -> Result<(), ClientError> {
        match backend {
            Backend::Database => self.relational.validate(id).await,
            Backend::VectorStore => self.vectors.validate(id).await,
            Backend::Templates => self.templates.validate(id).await,
        }
    }
}

impl std::fmt::Debug for ProjectOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectOrchestrator")
            .field("extensions", &self.extensions)
            .field("has_registry", &self.registry.is_some())
            .finish()
    }
}
