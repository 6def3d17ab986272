//! Project creation
//!
//! A project spans a relational schema, a vector collection and a set of
//! adapted templates. The orchestrator provisions them in order, runs the
//! registered extensions, validates everything, and compensates in reverse
//! order when a fatal step fails.

pub mod errors;
pub mod orchestrator;
pub mod router;
pub mod state;
pub mod types;


pub use errors::{ClientError, ConfigError, ErrorClass, ExtensionError, ProjectError, TransitionError};
pub use orchestrator::ProjectOrchestrator;
pub use router::ProjectOrchestratorRouter;
pub use state::{ErrorRecord, ProjectState};
pub use types::{
    Backend, CleanupRecord, CollectionHandle, ExtensionOutcome, ExtensionStatus, OverallStatus,
    Phase, PhaseStatus, ProjectConfig, ProjectId, ProjectRecord, ProjectSettings, Resource,
    ResourceHandle, ResourceHandles, SchemaHandle, TemplateSetHandle, DEFAULT_LANGUAGE,
    DEFAULT_PROJECT_TYPE,
};
