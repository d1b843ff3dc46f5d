//! Google Cloud Storage.

use async_trait::async_trait;
use object_store::gcp::GoogleCloudStorageBuilder;
use std::sync::Arc;

use super::{ArtifactReader, ArtifactStore, ArtifactStream, BlobBackend, StoreError};
use crate::config::GcpStorageSettings;
use crate::coordinate::CacheKey;

/// How service account credentials were supplied
#[derive(Debug, Clone, PartialEq, Eq)]
enum GcpCredentials<'a> {
    /// Inline service account JSON
    Json(&'a str),
    /// Path to a service account JSON file
    File(&'a str),
    /// Application default credentials
    Default,
}

impl<'a> GcpCredentials<'a> {
    fn from_setting(value: Option<&'a str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => GcpCredentials::Default,
            Some(v) if v.starts_with('{') => GcpCredentials::Json(v),
            Some(v) => GcpCredentials::File(v),
        }
    }
}

/// Module archives in a GCS bucket
#[derive(Debug, Clone)]
pub struct GcsArtifactStore {
    backend: BlobBackend,
}

impl GcsArtifactStore {
    pub fn connect(settings: &GcpStorageSettings) -> Result<Self, StoreError> {
        if settings.bucket_name.is_empty() {
            return Err(StoreError::Config(
                "GcpStorageBucketName is required for GCP storage".to_string(),
            ));
        }

        let builder = match GcpCredentials::from_setting(settings.credentials.as_deref()) {
            GcpCredentials::Json(json) => {
                GoogleCloudStorageBuilder::new().with_service_account_key(json)
            }
            GcpCredentials::File(path) => {
                GoogleCloudStorageBuilder::new().with_service_account_path(path)
            }
            GcpCredentials::Default => GoogleCloudStorageBuilder::from_env(),
        };

        let store = builder
            .with_bucket_name(&settings.bucket_name)
            .build()
            .map_err(|e| StoreError::Config(format!("Invalid GCP settings: {}", e)))?;

        if !settings.project_id.is_empty() {
            log::debug!(
                "GCS bucket {} in project {}",
                settings.bucket_name,
                settings.project_id
            );
        }

        Ok(Self {
            backend: BlobBackend::new("gcs", Arc::new(store)),
        })
    }
}

#[async_trait]
impl ArtifactStore for GcsArtifactStore {
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
