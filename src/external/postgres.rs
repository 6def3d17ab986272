//! PostgreSQL relational store
//!
//! Each project gets its own schema with the content tables, and one row in
//! `public.projects`. Creation is a single transaction so a failed create
//! leaves nothing behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::relational::{schema_name_for, ProjectRegistry, RelationalStore, REQUIRED_TABLES};
use super::retry::RetryPolicy;
use crate::config::DatabaseConfig;
use crate::project::{ClientError, ProjectConfig, ProjectId, ProjectRecord, SchemaHandle};

const REGISTRY_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS public.projects (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    schema_name TEXT NOT NULL UNIQUE,
    description JSONB NOT NULL DEFAULT '{}'::jsonb,
    settings JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

fn schema_ddl(schema: &str) -> String {
    format!(
        r#"
CREATE SCHEMA IF NOT EXISTS "{schema}";

CREATE TABLE IF NOT EXISTS "{schema}".object_models (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(100) NOT NULL UNIQUE,
    version VARCHAR(20) NOT NULL DEFAULT '1.0',
    definition JSONB NOT NULL,
    object_type VARCHAR(50) NOT NULL,
    description TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS "{schema}".contents (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    title VARCHAR(255) NOT NULL,
    content_type VARCHAR(100) NOT NULL,
    object_model_id UUID REFERENCES "{schema}".object_models(id),
    data JSONB NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
    status VARCHAR(50) NOT NULL DEFAULT 'draft',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS "{schema}".prompt_adaptation (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(100) NOT NULL UNIQUE,
    engine_type VARCHAR(50) NOT NULL,
    template_type VARCHAR(50) NOT NULL,
    template JSONB NOT NULL,
    description TEXT NOT NULL,
    version VARCHAR(20) NOT NULL DEFAULT '1.0',
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS "{schema}".prompt_history (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    template_id UUID REFERENCES "{schema}".prompt_adaptation(id),
    input_variables JSONB NOT NULL,
    full_prompt TEXT NOT NULL,
    response TEXT NOT NULL,
    operation_name VARCHAR(100),
    content_id UUID REFERENCES "{schema}".contents(id),
    metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS "{schema}".vocabulary (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(100) NOT NULL UNIQUE,
    values JSONB NOT NULL,
    description TEXT NOT NULL,
    is_system BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS object_models_object_type_idx ON "{schema}".object_models(object_type);
CREATE INDEX IF NOT EXISTS contents_content_type_idx ON "{schema}".contents(content_type);
CREATE INDEX IF NOT EXISTS contents_status_idx ON "{schema}".contents(status);
CREATE INDEX IF NOT EXISTS prompt_adaptation_template_type_idx ON "{schema}".prompt_adaptation(template_type);
CREATE INDEX IF NOT EXISTS prompt_history_template_id_idx ON "{schema}".prompt_history(template_id);
CREATE INDEX IF NOT EXISTS prompt_history_created_at_idx ON "{schema}".prompt_history(created_at);

INSERT INTO "{schema}".object_models (name, definition, object_type, description)
VALUES ('article', '{{"fields": ["title", "body", "summary"]}}'::jsonb, 'content', 'Default long-form article')
ON CONFLICT (name) DO NOTHING;
"#
    )
}

/// Map a sqlx failure onto the client error taxonomy
pub fn classify_sqlx_error(error: sqlx::Error) -> ClientError {
    match &error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Protocol(_) => ClientError::transient(error.to_string()),
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            classify_sqlstate(&code, db.message())
        }
        _ => ClientError::permanent(error.to_string()),
    }
}

/// Serialization failures, deadlocks, connection exceptions and resource
/// exhaustion can clear up on their own
fn classify_sqlstate(code: &str, message: &str) -> ClientError {
    match code {
        "40001" | "40P01" => ClientError::transient(format!("{code}: {message}")),
        "23505" => ClientError::permanent(format!("project already registered: {message}")),
        c if c.starts_with("08") || c.starts_with("53") || c.starts_with("57P") => {
            ClientError::transient(format!("{c}: {message}"))
        }
        c => ClientError::permanent(format!("{c}: {message}")),
    }
}

#[derive(Debug, Clone)]
pub struct PostgresRelationalStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresRelationalStore {
    /// Connect and make sure the project registry table exists
    pub async fn connect(config: &DatabaseConfig, retry: RetryPolicy) -> Result<Self, ClientError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(classify_sqlx_error)?;

        let store = Self::from_pool(pool, retry);
        store.ensure_registry().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    pub async fn ensure_registry(&self) -> Result<(), ClientError> {
        sqlx::query(REGISTRY_DDL)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn registered_schema(&self, id: &ProjectId) -> Result<Option<String>, ClientError> {
        let row = sqlx::query("SELECT schema_name FROM public.projects WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        row.map(|r| r.try_get::<String, _>("schema_name"))
            .transpose()
            .map_err(classify_sqlx_error)
    }

    async fn create_once(&self, id: &ProjectId, config: &ProjectConfig) -> Result<SchemaHandle, ClientError> {
        if let Some(schema_name) = self.registered_schema(id).await? {
            debug!(project.id = %id, schema = %schema_name, "Schema already provisioned");
            return Ok(handle(schema_name));
        }

        let schema_name = schema_name_for(&config.name, id);
        let settings = serde_json::to_value(&config.settings).unwrap_or_else(|_| json!({}));

        let mut tx = self.pool.begin().await.map_err(classify_sqlx_error)?;

        sqlx::raw_sql(&schema_ddl(&schema_name))
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO public.projects (id, name, schema_name, description, settings, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(id.as_uuid())
        .bind(&config.name)
        .bind(&schema_name)
        .bind(&config.description)
        .bind(&settings)
        .execute(&mut *tx)
        .await
        .map_err(classify_sqlx_error)?;

        tx.commit().await.map_err(classify_sqlx_error)?;

        info!(project.id = %id, schema = %schema_name, "Project schema created");
        Ok(handle(schema_name))
    }

    async fn delete_once(&self, id: &ProjectId) -> Result<(), ClientError> {
        let Some(schema_name) = self.registered_schema(id).await? else {
            debug!(project.id = %id, "No registered schema to drop");
            return Ok(());
        };

        let mut tx = self.pool.begin().await.map_err(classify_sqlx_error)?;

        sqlx::raw_sql(&format!(r#"DROP SCHEMA IF EXISTS "{schema_name}" CASCADE"#))
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;

        sqlx::query("DELETE FROM public.projects WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;

        tx.commit().await.map_err(classify_sqlx_error)?;

        info!(project.id = %id, schema = %schema_name, "Project schema dropped");
        Ok(())
    }

    async fn validate_once(&self, id: &ProjectId) -> Result<(), ClientError> {
        let schema_name = self
            .registered_schema(id)
            .await?
            .ok_or_else(|| ClientError::mismatch(format!("project {id} is not registered")))?;

        let tables: Vec<String> = REQUIRED_TABLES.iter().map(|t| t.to_string()).collect();
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS table_count
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_name = ANY($2)
            "#,
        )
        .bind(&schema_name)
        .bind(&tables)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        let found: i64 = row.try_get("table_count").map_err(classify_sqlx_error)?;
        if found as usize == REQUIRED_TABLES.len() {
            Ok(())
        } else {
            Err(ClientError::mismatch(format!(
                "schema {schema_name} has {found} of {} required tables",
                REQUIRED_TABLES.len()
            )))
        }
    }
}

fn handle(schema_name: String) -> SchemaHandle {
    SchemaHandle {
        schema_name,
        tables: REQUIRED_TABLES.iter().map(|t| t.to_string()).collect(),
    }
}

fn record_from_row(row: &PgRow) -> Result<ProjectRecord, sqlx::Error> {
    let id: Uuid = row.try_get("id")?;
    let description: Value = row.try_get("description")?;
    let settings: Value = row.try_get("settings")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(ProjectRecord {
        id: ProjectId::from(id),
        name: row.try_get("name")?,
        schema_name: row.try_get("schema_name")?,
        description,
        settings,
        created_at,
    })
}

#[async_trait]
impl RelationalStore for PostgresRelationalStore {
    async fn create(&self, id: &ProjectId, config: &ProjectConfig) -> Result<SchemaHandle, ClientError> {
        self.retry
            .run("database.create", || self.create_once(id, config))
            .await
    }

    async fn delete(&self, id: &ProjectId) -> Result<(), ClientError> {
        self.retry.run("database.delete", || self.delete_once(id)).await
    }

    async fn validate(&self, id: &ProjectId) -> Result<(), ClientError> {
        self.retry
            .run("database.validate", || self.validate_once(id))
            .await
    }
}

#[async_trait]
impl ProjectRegistry for PostgresRelationalStore {
    async fn get(&self, id: &ProjectId) -> Result<Option<ProjectRecord>, ClientError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, schema_name, description, settings, created_at
            FROM public.projects
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        row.as_ref()
            .map(record_from_row)
            .transpose()
            .map_err(classify_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_classification() {
        assert!(classify_sqlstate("40001", "serialization failure").is_transient());
        assert!(classify_sqlstate("40P01", "deadlock").is_transient());
        assert!(classify_sqlstate("08006", "connection failure").is_transient());
        assert!(classify_sqlstate("53300", "too many connections").is_transient());
        assert!(!classify_sqlstate("23505", "duplicate key").is_transient());
        assert!(!classify_sqlstate("42601", "syntax error").is_transient());
    }

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(classify_sqlx_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!classify_sqlx_error(sqlx::Error::RowNotFound).is_transient());
    }

    #[test]
    fn test_schema_ddl_creates_every_required_table() {
        let ddl = schema_ddl("proj_demo_0123abcd");
        for table in REQUIRED_TABLES {
            assert!(ddl.contains(&format!("\"proj_demo_0123abcd\".{table} (")));
        }
        assert!(!ddl.contains("{{"));
    }
}
