//! Process-local store, for tests and dry runs.

use async_trait::async_trait;
use object_store::memory::InMemory;
use std::sync::Arc;

use super::{ArtifactReader, ArtifactStore, ArtifactStream, BlobBackend, StoreError};
use crate::coordinate::CacheKey;

#[derive(Debug, Clone)]
pub struct MemoryArtifactStore {
    backend: BlobBackend,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            backend: BlobBackend::new("memory", Arc::new(InMemory::new())),
        }
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
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
