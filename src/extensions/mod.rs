//! Pluggable post-provisioning steps
//!
//! An extension runs after the three core backends exist and shares the same
//! lifecycle contract: it may fail the creation (critical) or only degrade it
//! (non-critical), may take part in validation, and is compensated when a
//! later step fails.

pub mod seo;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::project::{ConfigError, ExtensionError, ProjectState};

pub use seo::{SeoBootstrapper, SeoConfig, SeoExtension, SeoRequest, TerrainSummary};

/// A unit of work run inside project creation.
///
/// Flags must be constant for a given implementation. Extensions talk to each
/// other only through [`ProjectState::set_extension_data`].
#[async_trait]
pub trait Extension: Send + Sync {
    /// Unique name within one creation call
    fn name(&self) -> &str;

    /// A failing critical extension aborts creation and triggers compensation
    fn is_critical(&self) -> bool {
        true
    }

    fn requires_validation(&self) -> bool {
        false
    }

    async fn execute(&self, state: &mut ProjectState) -> Result<Value, ExtensionError>;

    async fn validate(&self, _state: &ProjectState) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Undo whatever `execute` did. Called only after a successful `execute`.
    async fn compensate(&self, _state: &ProjectState) -> Result<(), ExtensionError> {
        Ok(())
    }
}

/// Ordered set of extensions with unique names
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Arc<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: Arc<dyn Extension>) -> Result<(), ConfigError> {
        if self.contains(extension.name()) {
            return Err(ConfigError::DuplicateExtension {
                name: extension.name().to_string(),
            });
        }
        self.extensions.push(extension);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Registered extensions followed by `extra`, rejecting any repeated name
    pub fn merged(
        &self,
        extra: Vec<Arc<dyn Extension>>,
    ) -> Result<Vec<Arc<dyn Extension>>, ConfigError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut merged = Vec::with_capacity(self.extensions.len() + extra.len());

        for extension in self.extensions.iter().cloned().chain(extra) {
            if !seen.insert(extension.name().to_string()) {
                return Err(ConfigError::DuplicateExtension {
                    name: extension.name().to_string(),
                });
            }
            merged.push(extension);
        }

        Ok(merged)
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl Extension for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, _state: &mut ProjectState) -> Result<Value, ExtensionError> {
            Ok(json!({}))
        }
    }

    #[test]
    fn test_register_rejects_duplicate_names() {
        let mut registry = ExtensionRegistry::new();
        registry.register(Arc::new(Named("seo"))).unwrap();

        let err = registry.register(Arc::new(Named("seo"))).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateExtension { name: "seo".to_string() });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_merged_keeps_registration_order_then_per_call() {
        let mut registry = ExtensionRegistry::new();
        registry.register(Arc::new(Named("a"))).unwrap();
        registry.register(Arc::new(Named("b"))).unwrap();

        let merged = registry.merged(vec![Arc::new(Named("c"))]).unwrap();
        let names: Vec<&str> = merged.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merged_rejects_per_call_duplicate() {
        let mut registry = ExtensionRegistry::new();
        registry.register(Arc::new(Named("a"))).unwrap();

        let result = registry.merged(vec![Arc::new(Named("a"))]);
        assert!(matches!(result, Err(ConfigError::DuplicateExtension { .. })));
    }

    #[test]
    fn test_default_flags() {
        let ext = Named("x");
        assert!(ext.is_critical());
        assert!(!ext.requires_validation());
    }
}
