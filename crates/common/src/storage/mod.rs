//! Object storage abstraction
//!
//! Provides:
//! - The `ObjectStore` trait the image mirror writes through
//! - A Cloud Storage implementation (JSON API, multipart upload)
//! - An in-memory store for tests and dry runs

use crate::auth::TokenProvider;
use crate::errors::{AppError, Result};
use crate::upload::multipart_related;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Object attributes sent alongside the payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_type: String,
    /// Custom metadata (`x-goog-meta-*` on Cloud Storage)
    pub custom: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            custom: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

/// Trait for writing objects to a bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` under `key`, returning the object's canonical URI
    async fn put_object(&self, key: &str, body: Vec<u8>, meta: &ObjectMeta) -> Result<String>;

    /// Destination bucket name
    fn bucket(&self) -> &str;

    /// Canonical URI for a key in this store
    fn uri_for(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket(), key)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GcsObjectResource<'a> {
    name: &'a str,
    content_type: &'a str,
    #[serde(skip_serializing_if = "no_custom_metadata")]
    metadata: &'a BTreeMap<String, String>,
}

fn no_custom_metadata(metadata: &&BTreeMap<String, String>) -> bool {
    metadata.is_empty()
}

/// Cloud Storage client
pub struct GcsObjectStore {
    client: reqwest::Client,
    tokens: Arc<TokenProvider>,
    endpoint: String,
    bucket: String,
}

impl GcsObjectStore {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<TokenProvider>,
        endpoint: &str,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        }
    }

    fn storage_error(key: &str, message: impl Into<String>) -> AppError {
        AppError::Storage {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>, meta: &ObjectMeta) -> Result<String> {
        let url = format!("{}/upload/storage/v1/b/{}/o", self.endpoint, self.bucket);
        let resource = GcsObjectResource {
            name: key,
            content_type: &meta.content_type,
            metadata: &meta.custom,
        };
        let related = multipart_related(&resource, &meta.content_type, &body)?;
        let token = self.tokens.token().await?;

        let response = self
            .client
            .post(&url)
            .query(&[("uploadType", "multipart")])
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, related.content_type)
            .body(related.body)
            .send()
            .await
            .map_err(|e| Self::storage_error(key, format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::storage_error(
                key,
                format!("Upload rejected {}: {}", status, body),
            ));
        }

        let uri = self.uri_for(key);
        debug!(uri = %uri, bytes = body.len(), "Object uploaded");
        Ok(uri)
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Object captured by the in-memory store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub meta: ObjectMeta,
}

/// In-memory object store for testing
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    rejected: BTreeSet<String>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(BTreeMap::new()),
            rejected: BTreeSet::new(),
        }
    }

    /// Fail every write to `key`
    pub fn rejecting(mut self, key: impl Into<String>) -> Self {
        self.rejected.insert(key.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>, meta: &ObjectMeta) -> Result<String> {
        if self.rejected.contains(key) {
            return Err(AppError::Storage {
                key: key.to_string(),
                message: "write rejected".to_string(),
            });
        }
        self.lock().insert(
            key.to_string(),
            StoredObject {
                body,
                meta: meta.clone(),
            },
        );
        Ok(self.uri_for(key))
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
