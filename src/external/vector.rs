//! Vector store abstractions and the Chroma HTTP client

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::retry::RetryPolicy;
use crate::config::VectorStoreConfig;
use crate::project::{ClientError, CollectionHandle, ProjectConfig, ProjectId};

/// Provisions and removes the per-project embedding collection
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Get-or-create the collection. Idempotent per id.
    async fn create(&self, id: &ProjectId, config: &ProjectConfig) -> Result<CollectionHandle, ClientError>;

    /// A missing collection is not an error
    async fn delete(&self, id: &ProjectId) -> Result<(), ClientError>;

    async fn validate(&self, id: &ProjectId) -> Result<(), ClientError>;
}

pub fn collection_name_for(id: &ProjectId) -> String {
    format!("project_{id}")
}

pub fn profile_id_for(id: &ProjectId) -> String {
    format!("project_profile_{id}")
}

/// Document summarizing a project, stored in its collection at creation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileDocument {
    pub id: String,
    pub document: String,
    pub metadata: Value,
}

/// Build the profile from the project name, description and settings
pub fn project_profile(id: &ProjectId, config: &ProjectConfig) -> ProfileDocument {
    let mut document = format!("Project: {}\n", config.name);

    if let Value::Object(description) = &config.description {
        for (key, value) in description {
            document.push_str(&format!("{key}: {}\n", plain(value)));
        }
    }

    if let Ok(Value::Object(settings)) = serde_json::to_value(&config.settings) {
        if !settings.is_empty() {
            document.push_str("Settings:\n");
            for (key, value) in &settings {
                document.push_str(&format!("  {key}: {}\n", plain(value)));
            }
        }
    }

    ProfileDocument {
        id: profile_id_for(id),
        document,
        metadata: json!({
            "project_id": id.to_string(),
            "type": "project_profile",
            "name": config.name,
        }),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    ids: [&'a str; 1],
    documents: [&'a str; 1],
    metadatas: [&'a Value; 1],
}

#[derive(Debug, Serialize)]
struct GetRequest<'a> {
    ids: [&'a str; 1],
    include: [&'static str; 1],
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    metadata: Value,
    get_or_create: bool,
}

/// Rate-limited client for a Chroma-compatible REST API
#[derive(Debug)]
pub struct ChromaVectorStore {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    retry: RetryPolicy,
}

impl ChromaVectorStore {
    pub fn new(config: &VectorStoreConfig, retry: RetryPolicy) -> Result<Self, ClientError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::permanent(format!("failed to build HTTP client: {e}")))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(per_second);
        let rate_limiter = Arc::new(RateLimiter::direct(
            Quota::per_second(per_second).allow_burst(burst),
        ));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            rate_limiter,
            retry,
        })
    }

    fn collections_url(&self) -> String {
        format!("{}/api/v1/collections", self.base_url)
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/{}", self.collections_url(), name)
    }

    /// Record endpoints address a collection by its server id, falling back to the name
    fn records_url(&self, collection: &CollectionResponse, action: &str) -> String {
        let key = collection.id.as_deref().unwrap_or(&collection.name);
        format!("{}/{}/{}", self.collections_url(), key, action)
    }

    fn classify_request_error(&self, error: reqwest::Error) -> ClientError {
        if error.is_timeout() {
            ClientError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if error.is_decode() {
            ClientError::mismatch(format!("unexpected response body: {error}"))
        } else {
            ClientError::transient(format!("vector store request failed: {error}"))
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ClientError> {
        self.rate_limiter.until_ready().await;
        request.send().await.map_err(|e| self.classify_request_error(e))
    }

    async fn fetch_collection(&self, name: &str) -> Result<CollectionResponse, ClientError> {
        let response = self.send(self.client.get(self.collection_url(name))).await?;
        let response = error_for_status(response).await?;
        response
            .json::<CollectionResponse>()
            .await
            .map_err(|e| self.classify_request_error(e))
    }
}

/// 408, 429 and 5xx are worth retrying; every other non-success status is not
pub fn classify_status(status: StatusCode, body: &str) -> ClientError {
    let message = format!("vector store returned {status}: {body}");
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ClientError::transient(message)
    } else {
        ClientError::permanent(message)
    }
}

async fn error_for_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

fn check_owner(collection: &CollectionResponse, id: &ProjectId) -> Result<(), ClientError> {
    let owner = collection
        .metadata
        .as_ref()
        .and_then(|m| m.get("project_id"))
        .and_then(Value::as_str);

    if owner == Some(id.to_string().as_str()) {
        Ok(())
    } else {
        Err(ClientError::mismatch(format!(
            "collection {} belongs to {:?}, expected {}",
            collection.name, owner, id
        )))
    }
}

#[async_trait]
impl VectorStore for ChromaVectorStore {
    async fn create(&self, id: &ProjectId, config: &ProjectConfig) -> Result<CollectionHandle, ClientError> {
        let name = collection_name_for(id);
        let body = CreateCollectionRequest {
            name: &name,
            metadata: json!({
                "project_id": id.to_string(),
                "project_name": config.name,
                "language": config.settings.language(),
            }),
            get_or_create: true,
        };

        let body = &body;
        let collection = self
            .retry
            .run("vector_store.create", || async move {
                let response = self
                    .send(self.client.post(self.collections_url()).json(body))
                    .await?;
                let response = error_for_status(response).await?;
                response
                    .json::<CollectionResponse>()
                    .await
                    .map_err(|e| self.classify_request_error(e))
            })
            .await?;

        check_owner(&collection, id)?;

        let profile = project_profile(id, config);
        let add = AddRequest {
            ids: [profile.id.as_str()],
            documents: [profile.document.as_str()],
            metadatas: [&profile.metadata],
        };
        let add = &add;
        let url = self.records_url(&collection, "add");
        let url = url.as_str();
        self.retry
            .run("vector_store.add_profile", || async move {
                let response = self.send(self.client.post(url).json(add)).await?;
                error_for_status(response).await.map(|_| ())
            })
            .await?;
        info!(project.id = %id, collection = %collection.name, "Vector collection ready");

        Ok(CollectionHandle {
            collection_name: collection.name,
            profile_id: profile.id,
        })
    }

    async fn delete(&self, id: &ProjectId) -> Result<(), ClientError> {
        let name = collection_name_for(id);
        let name = name.as_str();

        self.retry
            .run("vector_store.delete", || async move {
                let response = self.send(self.client.delete(self.collection_url(name))).await?;
                if response.status() == StatusCode::NOT_FOUND {
                    debug!(collection = %name, "Collection already absent");
                    return Ok(());
                }
                error_for_status(response).await.map(|_| ())
            })
            .await
    }

    async fn validate(&self, id: &ProjectId) -> Result<(), ClientError> {
        let name = collection_name_for(id);
        let name = name.as_str();
        let collection = self
            .retry
            .run("vector_store.validate", || self.fetch_collection(name))
            .await?;
        check_owner(&collection, id)?;

        let profile_id = profile_id_for(id);
        let query = GetRequest {
            ids: [profile_id.as_str()],
            include: ["metadatas"],
        };
        let query = &query;
        let url = self.records_url(&collection, "get");
        let url = url.as_str();
        let found = self
            .retry
            .run("vector_store.validate_profile", || async move {
                let response = self.send(self.client.post(url).json(query)).await?;
                let response = error_for_status(response).await?;
                response
                    .json::<GetResponse>()
                    .await
                    .map_err(|e| self.classify_request_error(e))
            })
            .await?;

        if found.ids.contains(&profile_id) {
            Ok(())
        } else {
            Err(ClientError::mismatch(format!(
                "collection {} has no project profile",
                collection.name
            )))
        }
    }
}
