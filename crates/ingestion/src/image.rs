//! Image mirroring
//!
//! Fetches a product image and copies the bytes to object storage under the
//! product id. Failures are returned per record; the caller decides to keep
//! the row with a null image reference.

use crate::product_id::ProductId;
use async_trait::async_trait;
use catalog_prep_common::errors::AppError;
use catalog_prep_common::storage::{ObjectMeta, ObjectStore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("GET {url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Status { .. } => "http_status",
            FetchError::Transport { .. } => "transport",
        }
    }
}

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Upload failed: {0}")]
    Upload(#[from] AppError),
}

impl MirrorError {
    /// Label used in logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            MirrorError::Fetch(e) => e.reason(),
            MirrorError::Upload(_) => "upload",
        }
    }
}

/// Trait for downloading source images
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Full response body, or an error for transport failures and non-2xx statuses
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed fetcher with a per-request timeout
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

/// Where a mirrored image ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredImage {
    pub uri: String,
    pub bytes: usize,
    /// Hex SHA-256 of the payload
    pub sha256: String,
}

/// Copies source images into object storage
pub struct ImageMirror {
    fetcher: Arc<dyn ImageFetcher>,
    store: Arc<dyn ObjectStore>,
    object_prefix: String,
    content_type: String,
}

impl ImageMirror {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        store: Arc<dyn ObjectStore>,
        object_prefix: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            store,
            object_prefix: object_prefix.into(),
            content_type: content_type.into(),
        }
    }

    /// `{prefix}/{product_id}.jpg`
    pub fn object_key(&self, product_id: &ProductId) -> String {
        let prefix = self.object_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}.jpg", product_id)
        } else {
            format!("{}/{}.jpg", prefix, product_id)
        }
    }

    pub async fn mirror(&self, url: &str, product_id: &ProductId) -> Result<MirroredImage, MirrorError> {
        let body = self.fetcher.fetch(url).await?;
        let sha256 = hex::encode(Sha256::digest(&body));
        let bytes = body.len();

        let key = self.object_key(product_id);
        let meta = ObjectMeta::new(self.content_type.as_str())
            .with("source_url", url)
            .with("sha256", sha256.as_str());

        let uri = self.store.put_object(&key, body, &meta).await?;
        debug!(product_id = %product_id, uri = %uri, bytes, "Image mirrored");

        Ok(MirroredImage { uri, bytes, sha256 })
    }
}
