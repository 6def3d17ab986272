//! Template adaptation
//!
//! Projects start from a shared catalog of base prompt templates. Adaptation
//! keeps the templates that apply to the project's content types and stamps
//! them with the project language.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::project::{ClientError, ProjectConfig, ProjectId, ProjectSettings, TemplateSetHandle};

/// Adapts and removes the per-project template set
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Adapt the catalog for this project. Idempotent per id.
    async fn create(&self, id: &ProjectId, config: &ProjectConfig) -> Result<TemplateSetHandle, ClientError>;

    /// A project without templates is not an error
    async fn delete(&self, id: &ProjectId) -> Result<(), ClientError>;

    /// At least one adapted template must exist
    async fn validate(&self, id: &ProjectId) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseTemplate {
    pub name: String,
    /// `None` applies to every project
    pub content_type: Option<String>,
    pub body: String,
}

impl BaseTemplate {
    fn new(name: &str, content_type: Option<&str>, body: &str) -> Self {
        Self {
            name: name.to_string(),
            content_type: content_type.map(str::to_string),
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptedTemplate {
    pub name: String,
    pub language: String,
    pub body: String,
}

pub fn default_catalog() -> Vec<BaseTemplate> {
    vec![
        BaseTemplate::new(
            "article_outline",
            Some("article"),
            "Outline an article about {topic} for {audience}.",
        ),
        BaseTemplate::new(
            "article_body",
            Some("article"),
            "Write the article section {section} following the outline {outline}.",
        ),
        BaseTemplate::new(
            "product_description",
            Some("product"),
            "Describe the product {product} highlighting {features}.",
        ),
        BaseTemplate::new(
            "meta_description",
            None,
            "Summarize {content} in under 160 characters.",
        ),
        BaseTemplate::new(
            "social_post",
            None,
            "Write a short social media post promoting {content}.",
        ),
    ]
}

/// Keep templates matching the configured content types (all when none are
/// configured) and stamp them with the project language.
///
/// Returns the adapted templates and the number skipped.
pub fn adapt_catalog(catalog: &[BaseTemplate], settings: &ProjectSettings) -> (Vec<AdaptedTemplate>, usize) {
    let language = settings.language();
    let applies = |template: &BaseTemplate| match &template.content_type {
        None => true,
        Some(_) if settings.content_types.is_empty() => true,
        Some(kind) => settings.content_types.iter().any(|t| t == kind),
    };

    let adapted: Vec<AdaptedTemplate> = catalog
        .iter()
        .filter(|t| applies(t))
        .map(|t| AdaptedTemplate {
            name: t.name.clone(),
            language: language.to_string(),
            body: format!("[lang:{language}] {}", t.body),
        })
        .collect();

    let skipped = catalog.len() - adapted.len();
    (adapted, skipped)
}

/// Template store backed by a base catalog held in process memory
#[derive(Debug)]
pub struct CatalogTemplateStore {
    catalog: Vec<BaseTemplate>,
    adapted: Mutex<HashMap<ProjectId, Vec<AdaptedTemplate>>>,
}

impl CatalogTemplateStore {
    pub fn new(catalog: Vec<BaseTemplate>) -> Self {
        Self {
            catalog,
            adapted: Mutex::new(HashMap::new()),
        }
    }

    pub fn templates_for(&self, id: &ProjectId) -> Vec<AdaptedTemplate> {
        self.adapted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for CatalogTemplateStore {
    fn default() -> Self {
        Self::new(default_catalog())
    }
}

#[async_trait]
impl TemplateStore for CatalogTemplateStore {
    async fn create(&self, id: &ProjectId, config: &ProjectConfig) -> Result<TemplateSetHandle, ClientError> {
        let (adapted, skipped) = adapt_catalog(&self.catalog, &config.settings);
        let names = adapted.iter().map(|t| t.name.clone()).collect();

        self.adapted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*id, adapted);

        info!(project.id = %id, skipped, "Templates adapted");
        Ok(TemplateSetHandle {
            adapted: names,
            skipped,
        })
    }

    async fn delete(&self, id: &ProjectId) -> Result<(), ClientError> {
        let removed = self
            .adapted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);

        match removed {
            Some(templates) => info!(project.id = %id, count = templates.len(), "Removed adapted templates"),
            None => debug!(project.id = %id, "No adapted templates to remove"),
        }
        Ok(())
    }

    async fn validate(&self, id: &ProjectId) -> Result<(), ClientError> {
        if self.templates_for(id).is_empty() {
            Err(ClientError::mismatch(format!("no adapted templates for project {id}")))
        } else {
            Ok(())
        }
    }
}
