//! Object storage for module archives.
//!
//! Every backend implements [`ArtifactStore`]; callers never learn which one
//! is active. [`connect_store`] is the only place that looks at the configured
//! backend type.
//!
//! Supported backends:
//! - Amazon S3 and S3-compatible services (MinIO, ...)
//! - Azure Blob Storage containers
//! - Google Cloud Storage buckets

mod aws;
mod azure;
mod backend;
mod gcp;
mod memory;

pub use aws::S3ArtifactStore;
pub use azure::AzureArtifactStore;
pub use backend::BlobBackend;
pub use gcp::GcsArtifactStore;
pub use memory::MemoryArtifactStore;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::config::{StorageSettings, StorageType};
use crate::coordinate::CacheKey;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Archive bytes as they arrive from the backend
pub type ArtifactStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Archive bytes handed to [`ArtifactStore::put`]
pub type ArtifactReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("{backend} request for {key} failed: {source}")]
    Failed {
        backend: &'static str,
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("IO error while uploading {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Exists / get / put over one object storage service
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Short backend label, for logs only
    fn name(&self) -> &'static str;

    /// Metadata-only lookup. An absent key is `Ok(false)`.
    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError>;

    /// Stream the object at `key`; [`StoreError::NotFound`] when absent
    async fn get(&self, key: &CacheKey) -> Result<ArtifactStream, StoreError>;

    /// Write `body` to `key`, returning the number of bytes stored.
    ///
    /// A failed upload never leaves a visible object behind.
    async fn put(
        &self,
        key: &CacheKey,
        body: ArtifactReader,
        content_type: &str,
    ) -> Result<u64, StoreError>;
}

/// Build the configured backend
pub fn connect_store(settings: &StorageSettings) -> Result<Arc<dyn ArtifactStore>, StoreError> {
    let store: Arc<dyn ArtifactStore> = match settings.storage_type {
        StorageType::Aws => Arc::new(S3ArtifactStore::connect(&settings.aws)?),
        StorageType::Azure => Arc::new(AzureArtifactStore::connect(&settings.azure)?),
        StorageType::Gcp => Arc::new(GcsArtifactStore::connect(&settings.gcp)?),
    };
    log::info!("Using {} storage for module archives", store.name());
    Ok(store)
}
