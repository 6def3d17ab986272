//! In-memory collaborators
//!
//! Used for offline runs and as instrumented doubles in tests. All stores built
//! from one [`CallJournal`] record their calls into the same ordered log, so
//! tests can assert cross-store ordering such as reverse-order compensation.
//! Each store can be told to fail an operation (every time or once) and to
//! sleep before answering.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use super::relational::{schema_name_for, ProjectRegistry, RelationalStore, REQUIRED_TABLES};
use super::template::{CatalogTemplateStore, TemplateStore};
use super::vector::{collection_name_for, project_profile, ProfileDocument, VectorStore};
use crate::extensions::{SeoBootstrapper, SeoRequest, TerrainSummary};
use crate::project::{
    Backend, ClientError, CollectionHandle, ProjectConfig, ProjectId, ProjectRecord, SchemaHandle,
    TemplateSetHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Delete,
    Validate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub backend: Backend,
    pub operation: Operation,
    pub project_id: ProjectId,
}

/// Shared ordered log of every store call
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl CallJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: RecordedCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls of one kind, in order, as backends
    pub fn backends_for(&self, operation: Operation) -> Vec<Backend> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.backend)
            .collect()
    }

    pub fn count(&self, backend: Backend, operation: Operation) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.backend == backend && c.operation == operation)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

#[derive(Debug, Clone)]
enum Fault {
    Sticky(ClientError),
    Once(ClientError),
}

/// Journal, failure injection and latency shared by the in-memory stores
#[derive(Debug)]
struct Harness {
    backend: Backend,
    journal: CallJournal,
    faults: Mutex<HashMap<Operation, Fault>>,
    latency: Mutex<Option<Duration>>,
}

impl Harness {
    fn new(backend: Backend, journal: CallJournal) -> Self {
        Self {
            backend,
            journal,
            faults: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
        }
    }

    fn set_fault(&self, operation: Operation, fault: Option<Fault>) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match fault {
            Some(fault) => faults.insert(operation, fault),
            None => faults.remove(&operation),
        };
    }

    fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Record the call, wait out any latency, then surface an injected fault
    async fn enter(&self, operation: Operation, project_id: &ProjectId) -> Result<(), ClientError> {
        self.journal.record(RecordedCall {
            backend: self.backend,
            operation,
            project_id: *project_id,
        });

        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match faults.get(&operation).cloned() {
            Some(Fault::Sticky(error)) => Err(error),
            Some(Fault::Once(error)) => {
                faults.remove(&operation);
                Err(error)
            }
            None => Ok(()),
        }
    }
}

macro_rules! fault_controls {
    ($store:ty) => {
        impl $store {
            /// Fail every call of `operation` with `error`
            pub fn fail_on(&self, operation: Operation, error: ClientError) {
                self.harness.set_fault(operation, Some(Fault::Sticky(error)));
            }

            /// Fail only the next call of `operation`
            pub fn fail_once(&self, operation: Operation, error: ClientError) {
                self.harness.set_fault(operation, Some(Fault::Once(error)));
            }

            pub fn clear_failure(&self, operation: Operation) {
                self.harness.set_fault(operation, None);
            }

            /// Delay every call by `latency`
            pub fn set_latency(&self, latency: Duration) {
                self.harness.set_latency(Some(latency));
            }

            pub fn journal(&self) -> &CallJournal {
                &self.harness.journal
            }
        }
    };
}

/// Relational store and project registry held in process memory
#[derive(Debug)]
pub struct InMemoryRelationalStore {
    harness: Harness,
    projects: Mutex<HashMap<ProjectId, ProjectRecord>>,
}

impl InMemoryRelationalStore {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            harness: Harness::new(Backend::Database, journal),
            projects: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, id: &ProjectId) -> bool {
        self.projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(schema_name: String) -> SchemaHandle {
        SchemaHandle {
            schema_name,
            tables: REQUIRED_TABLES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Default for InMemoryRelationalStore {
    fn default() -> Self {
        Self::new(CallJournal::new())
    }
}

fault_controls!(InMemoryRelationalStore);

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn create(&self, id: &ProjectId, config: &ProjectConfig) -> Result<SchemaHandle, ClientError> {
        self.harness.enter(Operation::Create, id).await?;

        let mut projects = self.projects.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = projects.get(id) {
            return Ok(Self::handle(existing.schema_name.clone()));
        }
        if projects.values().any(|p| p.name == config.name) {
            return Err(ClientError::permanent(format!(
                "project name `{}` is already registered",
                config.name
            )));
        }

        let schema_name = schema_name_for(&config.name, id);
        projects.insert(
            *id,
            ProjectRecord {
                id: *id,
                name: config.name.clone(),
                schema_name: schema_name.clone(),
                description: config.description.clone(),
                settings: serde_json::to_value(&config.settings).unwrap_or_else(|_| json!({})),
                created_at: Utc::now(),
            },
        );
        debug!(project.id = %id, schema = %schema_name, "Created in-memory schema");
        Ok(Self::handle(schema_name))
    }

    async fn delete(&self, id: &ProjectId) -> Result<(), ClientError> {
        self.harness.enter(Operation::Delete, id).await?;
        self.projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }

    async fn validate(&self, id: &ProjectId) -> Result<(), ClientError> {
        self.harness.enter(Operation::Validate, id).await?;
        if self.contains(id) {
            Ok(())
        } else {
            Err(ClientError::mismatch(format!("no schema registered for project {id}")))
        }
    }
}

#[async_trait]
impl ProjectRegistry for InMemoryRelationalStore {
    async fn get(&self, id: &ProjectId) -> Result<Option<ProjectRecord>, ClientError> {
        Ok(self
            .projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }
}

#[derive(Debug)]
pub struct InMemoryVectorStore {
    harness: Harness,
    collections: Mutex<HashMap<ProjectId, ProfileDocument>>,
}

impl InMemoryVectorStore {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            harness: Harness::new(Backend::VectorStore, journal),
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, id: &ProjectId) -> bool {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Profile document stored in the project's collection
    pub fn profile(&self, id: &ProjectId) -> Option<ProfileDocument> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(CallJournal::new())
    }
}

fault_controls!(InMemoryVectorStore);

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create(&self, id: &ProjectId, config: &ProjectConfig) -> Result<CollectionHandle, ClientError> {
        self.harness.enter(Operation::Create, id).await?;
        let profile = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(*id)
            .or_insert_with(|| project_profile(id, config))
            .clone();
        Ok(CollectionHandle {
            collection_name: collection_name_for(id),
            profile_id: profile.id,
        })
    }

    async fn delete(&self, id: &ProjectId) -> Result<(), ClientError> {
        self.harness.enter(Operation::Delete, id).await?;
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }

    async fn validate(&self, id: &ProjectId) -> Result<(), ClientError> {
        self.harness.enter(Operation::Validate, id).await?;
        match self.profile(id) {
            Some(profile) if profile.metadata["project_id"] == id.to_string() => Ok(()),
            Some(_) => Err(ClientError::mismatch(format!(
                "profile in collection for project {id} belongs to another project"
            ))),
            None => Err(ClientError::mismatch(format!("no collection for project {id}"))),
        }
    }
}

/// Catalog template store with journal and fault injection
#[derive(Debug)]
pub struct InMemoryTemplateStore {
    harness: Harness,
    inner: CatalogTemplateStore,
}

impl InMemoryTemplateStore {
    pub fn new(journal: CallJournal) -> Self {
        Self::with_store(journal, CatalogTemplateStore::default())
    }

    pub fn with_store(journal: CallJournal, inner: CatalogTemplateStore) -> Self {
        Self {
            harness: Harness::new(Backend::Templates, journal),
            inner,
        }
    }

    pub fn contains(&self, id: &ProjectId) -> bool {
        !self.inner.templates_for(id).is_empty()
    }
}

impl Default for InMemoryTemplateStore {
    fn default() -> Self {
        Self::new(CallJournal::new())
    }
}

fault_controls!(InMemoryTemplateStore);

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn create(&self, id: &ProjectId, config: &ProjectConfig) -> Result<TemplateSetHandle, ClientError> {
        self.harness.enter(Operation::Create, id).await?;
        self.inner.create(id, config).await
    }

    async fn delete(&self, id: &ProjectId) -> Result<(), ClientError> {
        self.harness.enter(Operation::Delete, id).await?;
        self.inner.delete(id).await
    }

    async fn validate(&self, id: &ProjectId) -> Result<(), ClientError> {
        self.harness.enter(Operation::Validate, id).await?;
        self.inner.validate(id).await
    }
}

/// The three in-memory stores wired to one journal
#[derive(Debug, Clone)]
pub struct InMemoryBackends {
    pub journal: CallJournal,
    pub relational: Arc<InMemoryRelationalStore>,
    pub vectors: Arc<InMemoryVectorStore>,
    pub templates: Arc<InMemoryTemplateStore>,
}

impl InMemoryBackends {
    pub fn new() -> Self {
        let journal = CallJournal::new();
        Self {
            relational: Arc::new(InMemoryRelationalStore::new(journal.clone())),
            vectors: Arc::new(InMemoryVectorStore::new(journal.clone())),
            templates: Arc::new(InMemoryTemplateStore::new(journal.clone())),
            journal,
        }
    }

    /// Whether any backend still holds a resource for `id`
    pub fn holds_any(&self, id: &ProjectId) -> bool {
        self.relational.contains(id) || self.vectors.contains(id) || self.templates.contains(id)
    }
}

impl Default for InMemoryBackends {
    fn default() -> Self {
        Self::new()
    }
}

/// SEO collaborator that derives keywords from the seed topics
#[derive(Debug, Default)]
pub struct InMemorySeoBootstrapper {
    initialized: Mutex<HashSet<ProjectId>>,
    failure: Mutex<Option<ClientError>>,
    terrain_failure: Mutex<Option<ClientError>>,
}

impl InMemorySeoBootstrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `initialize` call with `error`
    pub fn fail_with(&self, error: ClientError) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Fail every `bootstrap_terrain` call with `error`
    pub fn fail_terrain_with(&self, error: ClientError) {
        *self.terrain_failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub fn contains(&self, id: &ProjectId) -> bool {
        self.initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

#[async_trait]
impl SeoBootstrapper for InMemorySeoBootstrapper {
    async fn initialize(&self, project_id: &ProjectId, _request: &SeoRequest) -> Result<(), ClientError> {
        if let Some(error) = self.failure.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            return Err(error);
        }
        self.initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*project_id);
        Ok(())
    }

    async fn bootstrap_terrain(
        &self,
        _project_id: &ProjectId,
        request: &SeoRequest,
    ) -> Result<TerrainSummary, ClientError> {
        if let Some(error) = self
            .terrain_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(error);
        }
        let keywords = request
            .seed_topics
            .iter()
            .flat_map(|topic| [topic.clone(), format!("best {topic}"), format!("{topic} guide")])
            .collect();
        let opportunities = request
            .seed_topics
            .iter()
            .map(|topic| format!("{topic} guide"))
            .collect();
        Ok(TerrainSummary {
            keywords,
            opportunities,
        })
    }

    async fn is_initialized(&self, project_id: &ProjectId) -> Result<bool, ClientError> {
        Ok(self.contains(project_id))
    }

    async fn teardown(&self, project_id: &ProjectId) -> Result<(), ClientError> {
        self.initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(project_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_journal_is_shared_across_stores() {
        let backends = InMemoryBackends::new();
        let id = ProjectId::new();
        let config = ProjectConfig::new("Demo");

        backends.relational.create(&id, &config).await.unwrap();
        backends.vectors.create(&id, &config).await.unwrap();
        backends.templates.delete(&id).await.unwrap();

        let calls = backends.journal.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].backend, Backend::Database);
        assert_eq!(calls[2].operation, Operation::Delete);
        assert!(calls.iter().all(|c| c.project_id == id));
    }

    #[tokio::test]
    async fn test_one_shot_failure_clears_itself() {
        let store = InMemoryVectorStore::default();
        let id = ProjectId::new();
        store.fail_once(Operation::Create, ClientError::transient("flaky"));

        assert!(store.create(&id, &ProjectConfig::new("Demo")).await.is_err());
        assert!(store.create(&id, &ProjectConfig::new("Demo")).await.is_ok());
    }

    #[tokio::test]
    async fn test_sticky_failure_persists_until_cleared() {
        let store = InMemoryTemplateStore::default();
        let id = ProjectId::new();
        store.fail_on(Operation::Delete, ClientError::permanent("locked"));

        assert!(store.delete(&id).await.is_err());
        assert!(store.delete(&id).await.is_err());
        store.clear_failure(Operation::Delete);
        assert!(store.delete(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_relational_create_is_idempotent_and_names_unique() {
        let store = InMemoryRelationalStore::default();
        let id = ProjectId::new();
        let config = ProjectConfig::new("Demo");

        let first = store.create(&id, &config).await.unwrap();
        let second = store.create(&id, &config).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.tables.len(), REQUIRED_TABLES.len());

        let other = ProjectId::new();
        let err = store.create(&other, &config).await.unwrap_err();
        assert!(matches!(err, ClientError::Permanent { .. }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_an_error() {
        let backends = InMemoryBackends::new();
        let id = ProjectId::new();
        let config = ProjectConfig::new("Demo");
        backends.relational.create(&id, &config).await.unwrap();

        backends.relational.delete(&id).await.unwrap();
        backends.relational.delete(&id).await.unwrap();
        backends.vectors.delete(&id).await.unwrap();
        backends.vectors.delete(&id).await.unwrap();
        assert!(!backends.holds_any(&id));
        assert!(backends.relational.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_vector_create_stores_project_profile() {
        let store = InMemoryVectorStore::default();
        let id = ProjectId::new();

        let handle = store.create(&id, &ProjectConfig::new("Demo")).await.unwrap();

        let profile = store.profile(&id).unwrap();
        assert_eq!(handle.profile_id, profile.id);
        assert_eq!(profile.metadata["type"], "project_profile");
        assert!(profile.document.starts_with("Project: Demo"));
        assert!(store.validate(&id).await.is_ok());

        store.delete(&id).await.unwrap();
        assert!(store.profile(&id).is_none());
        assert!(store.validate(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_seo_bootstrapper_terrain() {
        let seo = InMemorySeoBootstrapper::new();
        let request = SeoRequest {
            language: "en".to_string(),
            location: "United States".to_string(),
            seed_topics: vec!["coffee".to_string()],
        };
        let terrain = seo.bootstrap_terrain(&ProjectId::new(), &request).await.unwrap();
        assert_eq!(terrain.keywords, vec!["coffee", "best coffee", "coffee guide"]);
        assert_eq!(terrain.opportunities.len(), 1);
    }
}
