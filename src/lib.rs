// Project Orchestrator Library - multi-backend project creation with compensation
// This exposes the core components for testing and integration

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod extensions;
pub mod external;
pub mod project;
pub mod shutdown;
pub mod telemetry;

// Re-export key types for easy access
pub use bootstrap::initialize_project_management;
pub use config::{DatabaseConfig, ObservabilityConfig, OrchestratorConfig, VectorStoreConfig};
pub use extensions::{Extension, ExtensionRegistry, SeoBootstrapper, SeoExtension};
pub use external::{
    CallJournal, ChromaVectorStore, InMemoryBackends, ProjectRegistry, RelationalStore,
    RetryConfig, RetryPolicy, TemplateStore, VectorStore,
};
pub use project::{
    ClientError, ConfigError, ExtensionError, OverallStatus, Phase, PhaseStatus, ProjectConfig,
    ProjectError, ProjectId, ProjectOrchestrator, ProjectOrchestratorRouter, ProjectState,
};
pub use shutdown::cancel_on_ctrl_c;
pub use telemetry::{init_telemetry, project_creation_span};
