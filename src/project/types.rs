// Core types for project creation: inputs, phases, statuses and handles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::errors::ConfigError;

/// Project type used when a config does not name one
pub const DEFAULT_PROJECT_TYPE: &str = "content";

/// Language assumed when settings do not name one
pub const DEFAULT_LANGUAGE: &str = "en";

/// Identifier assigned to a project when its creation starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// First eight hex digits, used to keep derived names unique
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ProjectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable input describing the project to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default = "empty_document")]
    pub description: Value,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(rename = "type", default = "default_project_type")]
    pub project_type: String,
}

fn empty_document() -> Value {
    Value::Object(Map::new())
}

fn default_project_type() -> String {
    DEFAULT_PROJECT_TYPE.to_string()
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: empty_document(),
            settings: ProjectSettings::default(),
            project_type: default_project_type(),
        }
    }

    pub fn with_description(mut self, description: Value) -> Self {
        self.description = description;
        self
    }

    pub fn with_settings(mut self, settings: ProjectSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_setting(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.settings.set(key, value.into());
        self
    }

    pub fn with_project_type(mut self, project_type: impl Into<String>) -> Self {
        self.project_type = project_type.into();
        self
    }

    /// Reject configs that must not reach any backend
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        match &self.description {
            Value::Object(_) | Value::Null => {}
            _ => return Err(ConfigError::InvalidDescription),
        }

        if let Some(language) = &self.settings.language {
            if language.trim().is_empty() {
                return Err(ConfigError::InvalidSetting {
                    key: "language".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }

        if self.settings.content_types.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::InvalidSetting {
                key: "content_types".to_string(),
                reason: "entries must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Recognized project options plus free-form extension toggles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_types: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectSettings {
    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        match key {
            "language" => self.language = value.as_str().map(str::to_string),
            "content_types" => {
                self.content_types = value
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default()
            }
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Boolean toggle; absent or non-boolean values read as false
    pub fn flag(&self, key: &str) -> bool {
        self.extra.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.extra
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Ordered steps of project creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Database,
    VectorStore,
    Templates,
    Extensions,
    Validation,
}

impl Phase {
    /// Execution order
    pub const ALL: [Phase; 5] = [
        Phase::Database,
        Phase::VectorStore,
        Phase::Templates,
        Phase::Extensions,
        Phase::Validation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Database => "database",
            Phase::VectorStore => "vector_store",
            Phase::Templates => "templates",
            Phase::Extensions => "extensions",
            Phase::Validation => "validation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl PhaseStatus {
    /// Whether moving from `self` to `next` is a legal forward step
    pub fn can_advance_to(&self, next: PhaseStatus) -> bool {
        matches!(
            (self, next),
            (PhaseStatus::NotStarted, PhaseStatus::InProgress)
                | (PhaseStatus::InProgress, PhaseStatus::Completed)
                | (PhaseStatus::InProgress, PhaseStatus::Failed)
        )
    }
}

/// Final verdict of one creation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Every phase completed and no extension failed
    Success,
    /// Every phase completed but a non-critical extension failed
    PartialSuccess,
    /// Fatal failure, and some cleanup step failed too; resources may be orphaned
    PartialFailure,
    /// Fatal failure, fully compensated
    Failure,
}

impl OverallStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, OverallStatus::Success | OverallStatus::PartialSuccess)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Success => "success",
            OverallStatus::PartialSuccess => "partial_success",
            OverallStatus::PartialFailure => "partial_failure",
            OverallStatus::Failure => "failure",
        };
        f.write_str(s)
    }
}

/// The three backing stores every project spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Database,
    VectorStore,
    Templates,
}

impl Backend {
    /// Creation order
    pub const ALL: [Backend; 3] = [Backend::Database, Backend::VectorStore, Backend::Templates];

    pub fn phase(&self) -> Phase {
        match self {
            Backend::Database => Phase::Database,
            Backend::VectorStore => Phase::VectorStore,
            Backend::Templates => Phase::Templates,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phase().as_str())
    }
}

/// Anything the orchestrator creates and may have to undo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Backend(Backend),
    Extension(String),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Backend(backend) => write!(f, "{backend}"),
            Resource::Extension(name) => write!(f, "extension `{name}`"),
        }
    }
}

/// Relational schema provisioned for a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaHandle {
    pub schema_name: String,
    pub tables: Vec<String>,
}

/// Vector collection provisioned for a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionHandle {
    pub collection_name: String,
    /// Id of the project profile document stored in the collection
    pub profile_id: String,
}

/// Templates adapted for a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSetHandle {
    pub adapted: Vec<String>,
    pub skipped: usize,
}

/// Handle returned by a backend create call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceHandle {
    Schema(SchemaHandle),
    Collection(CollectionHandle),
    Templates(TemplateSetHandle),
}

impl ResourceHandle {
    pub fn backend(&self) -> Backend {
        match self {
            ResourceHandle::Schema(_) => Backend::Database,
            ResourceHandle::Collection(_) => Backend::VectorStore,
            ResourceHandle::Templates(_) => Backend::Templates,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceHandles {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates: Option<TemplateSetHandle>,
}

impl ResourceHandles {
    pub fn is_set(&self, backend: Backend) -> bool {
        match backend {
            Backend::Database => self.schema.is_some(),
            Backend::VectorStore => self.collection.is_some(),
            Backend::Templates => self.templates.is_some(),
        }
    }

    pub(crate) fn attach(&mut self, handle: ResourceHandle) {
        match handle {
            ResourceHandle::Schema(h) => self.schema = Some(h),
            ResourceHandle::Collection(h) => self.collection = Some(h),
            ResourceHandle::Templates(h) => self.templates = Some(h),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionStatus {
    Completed,
    Failed,
}

/// What happened when one extension ran
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtensionOutcome {
    pub name: String,
    pub critical: bool,
    pub status: ExtensionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Compensation result for one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupRecord {
    pub resource: Resource,
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Durable registry entry written by the relational store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    pub schema_name: String,
    pub description: Value,
    pub settings: Value,
    pub created_at: DateTime<Utc>,
}
