//! Azure Blob Storage.

use async_trait::async_trait;
use object_store::azure::MicrosoftAzureBuilder;
use std::sync::Arc;

use super::{ArtifactReader, ArtifactStore, ArtifactStream, BlobBackend, StoreError};
use crate::config::AzureStorageSettings;
use crate::coordinate::CacheKey;

/// Module archives in a blob container
#[derive(Debug, Clone)]
pub struct AzureArtifactStore {
    backend: BlobBackend,
}

impl AzureArtifactStore {
    pub fn connect(settings: &AzureStorageSettings) -> Result<Self, StoreError> {
        if settings.account_name.is_empty() || settings.container_name.is_empty() {
            return Err(StoreError::Config(
                "AzureStorageAccountName and AzureStorageContainerName are required for Azure storage"
                    .to_string(),
            ));
        }

        let mut builder = MicrosoftAzureBuilder::new()
            .with_account(&settings.account_name)
            .with_container_name(&settings.container_name);

        if !settings.account_key.is_empty() {
            builder = builder.with_access_key(&settings.account_key);
        }

        let store = builder
            .build()
            .map_err(|e| StoreError::Config(format!("Invalid Azure settings: {}", e)))?;

        Ok(Self {
            backend: BlobBackend::new("azure", Arc::new(store)),
        })
    }
}

#[async_trait]
impl ArtifactStore for AzureArtifactStore {
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
