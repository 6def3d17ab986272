//! Backend client abstractions
//!
//! Trait-based boundaries for the three stores a project spans, so the
//! orchestrator can be driven against real services or the in-memory doubles
//! through dependency injection.

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;
pub mod relational;
pub mod retry;
pub mod template;
pub mod vector;

pub use memory::{
    CallJournal, InMemoryBackends, InMemoryRelationalStore, InMemorySeoBootstrapper,
    InMemoryTemplateStore, InMemoryVectorStore, Operation, RecordedCall,
};
#[cfg(feature = "database")]
pub use postgres::PostgresRelationalStore;
pub use relational::{schema_name_for, ProjectRegistry, RelationalStore, REQUIRED_TABLES};
pub use retry::{RetryConfig, RetryPolicy};
pub use template::{adapt_catalog, default_catalog, CatalogTemplateStore, TemplateStore};
pub use vector::{
    collection_name_for, profile_id_for, project_profile, ChromaVectorStore, ProfileDocument,
    VectorStore,
};
