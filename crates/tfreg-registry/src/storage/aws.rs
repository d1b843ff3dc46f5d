//! Amazon S3 and S3-compatible services.

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use std::sync::Arc;

use super::{ArtifactReader, ArtifactStore, ArtifactStream, BlobBackend, StoreError};
use crate::config::AwsStorageSettings;
use crate::coordinate::CacheKey;

/// Module archives in an S3 bucket
#[derive(Debug, Clone)]
pub struct S3ArtifactStore {
    backend: BlobBackend,
}

impl S3ArtifactStore {
    /// Build a client for `settings.bucket_name`.
    ///
    /// Static keys are used when both are set, otherwise the usual AWS
    /// credential chain applies. A custom endpoint switches to path-style
    /// addressing, which MinIO and most S3 clones require.
    pub fn connect(settings: &AwsStorageSettings) -> Result<Self, StoreError> {
        if settings.bucket_name.is_empty() {
            return Err(StoreError::Config(
                "AwsStorageBucketName is required for AWS storage".to_string(),
            ));
        }

        let mut builder = AmazonS3Builder::new()
            .with_region(&settings.region)
            .with_bucket_name(&settings.bucket_name);

        if !settings.access_key.is_empty() && !settings.secret_key.is_empty() {
            builder = builder
                .with_access_key_id(&settings.access_key)
                .with_secret_access_key(&settings.secret_key);
        }

        if let Some(endpoint) = settings.endpoint.as_deref().filter(|e| !e.is_empty()) {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| StoreError::Config(format!("Invalid S3 settings: {}", e)))?;

        log::debug!(
            "S3 bucket {} in {}",
            settings.bucket_name,
            settings.region
        );

        Ok(Self {
            backend: BlobBackend::new("s3", Arc::new(store)),
        })
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        self.backend.exists(key).await
    }

    async fn get(&self, key: &CacheKey) -> Result<ArtifactStream, StoreError> {
        self.backend.get(key).await
    }

    async fn put(
        &self,
        key: &CacheKey,
        body: ArtifactReader,
        content_type: &str,
    ) -> Result<u64, StoreError> {
        self.backend.put(key, body, content_type).await
    }
}
