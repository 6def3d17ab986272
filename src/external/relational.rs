//! Relational store abstractions
//!
//! Every project owns one schema in the relational store, holding the
//! project's content tables, plus a row in the shared project registry.

use async_trait::async_trait;

use crate::project::{ClientError, ProjectConfig, ProjectId, ProjectRecord, SchemaHandle};

/// Tables every project schema must contain
pub const REQUIRED_TABLES: [&str; 5] = [
    "object_models",
    "contents",
    "prompt_adaptation",
    "prompt_history",
    "vocabulary",
];

const MAX_SLUG_LEN: usize = 50;

/// Provisions and removes the per-project schema
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Create the schema, its tables and the registry row. Idempotent per id.
    async fn create(&self, id: &ProjectId, config: &ProjectConfig) -> Result<SchemaHandle, ClientError>;

    /// Drop the schema and the registry row; a missing project is not an error
    async fn delete(&self, id: &ProjectId) -> Result<(), ClientError>;

    async fn validate(&self, id: &ProjectId) -> Result<(), ClientError>;
}

/// Read access to the durable project registry
#[async_trait]
pub trait ProjectRegistry: Send + Sync {
    async fn get(&self, id: &ProjectId) -> Result<Option<ProjectRecord>, ClientError>;
}

/// `proj_<slug>_<first 8 hex of id>`, safe to use unquoted in SQL
pub fn schema_name_for(name: &str, id: &ProjectId) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c);
        } else {
            pending_separator = true;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('_');

    if slug.is_empty() {
        format!("proj_{}", id.short())
    } else {
        format!("proj_{}_{}", slug, id.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn fixed_id() -> ProjectId {
        ProjectId::from(Uuid::parse_str("0123abcd-0000-4000-8000-000000000000").unwrap())
    }

    #[test]
    fn test_schema_name_collapses_separators() {
        assert_eq!(
            schema_name_for("  My Demo -- Project! ", &fixed_id()),
            "proj_my_demo_project_0123abcd"
        );
    }

    #[test]
    fn test_schema_name_drops_non_ascii() {
        assert_eq!(schema_name_for("Café Crème", &fixed_id()), "proj_caf_cr_me_0123abcd");
        assert_eq!(schema_name_for("日本", &fixed_id()), "proj_0123abcd");
    }

    #[test]
    fn test_schema_name_truncates_long_names() {
        let name = "a".repeat(120);
        let schema = schema_name_for(&name, &fixed_id());
        assert_eq!(schema.len(), "proj_".len() + MAX_SLUG_LEN + "_0123abcd".len());
        assert!(schema.len() < 64);
    }
}
