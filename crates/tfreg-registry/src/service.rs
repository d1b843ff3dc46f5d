//! Registry operations behind the HTTP routes.

use std::sync::Arc;

use crate::cache::MaterializationCache;
use crate::config::RegistryConfig;
use crate::coordinate::ModuleCoordinate;
use crate::error::{RegistryError, Result};
use crate::metadata::{GraphQlMetadataClient, MetadataSource, ProviderFile, ProviderVersion};
use crate::storage::{connect_store, ArtifactStream, StoreError};

pub struct RegistryService {
    metadata: Arc<dyn MetadataSource>,
    cache: MaterializationCache,
}

impl RegistryService {
    pub fn new(metadata: Arc<dyn MetadataSource>, cache: MaterializationCache) -> Self {
        Self { metadata, cache }
    }

    /// Wire the configured store, metadata client and cache together
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let store = connect_store(&config.storage)?;
        let metadata = GraphQlMetadataClient::new(&config.api_url, config.api_timeout())?;
        let cache = MaterializationCache::new(store, &config.hostname)
            .with_scratch_dir(config.scratch_dir())
            .with_deadline(config.materialize_timeout());

        log::info!(
            "Registry at {} using metadata from {}",
            config.hostname,
            metadata.endpoint()
        );
        Ok(Self::new(Arc::new(metadata), cache))
    }

    pub fn cache(&self) -> &MaterializationCache {
        &self.cache
    }

    pub async fn module_versions(
        &self,
        organization: &str,
        name: &str,
        provider: &str,
    ) -> Result<Vec<String>> {
        Ok(self
            .metadata
            .module_versions(organization, name, provider)
            .await?)
    }

    /// Public download path of a module version, packaging it on first use
    pub async fn module_download_path(&self, coordinate: &ModuleCoordinate) -> Result<String> {
        let details = self
            .metadata
            .module_details(&coordinate.organization, &coordinate.name, &coordinate.provider)
            .await?;
        let source = details.source_descriptor();
        Ok(self.cache.materialize(coordinate, &source).await?)
    }

    /// Stream a stored module archive
    pub async fn open_archive(&self, coordinate: &ModuleCoordinate) -> Result<ArtifactStream> {
        match self.cache.store().get(&coordinate.cache_key()).await {
            Ok(stream) => Ok(stream),
            Err(StoreError::NotFound { .. }) => {
                Err(RegistryError::ArchiveNotFound(coordinate.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn provider_versions(
        &self,
        organization: &str,
        provider: &str,
    ) -> Result<Vec<ProviderVersion>> {
        Ok(self
            .metadata
            .provider_versions(organization, provider)
            .await?)
    }

    pub async fn provider_file(
        &self,
        organization: &str,
        provider: &str,
        version: &str,
        os: &str,
        arch: &str,
    ) -> Result<ProviderFile> {
        Ok(self
            .metadata
            .provider_file(organization, provider, version, os, arch)
            .await?)
    }
}
