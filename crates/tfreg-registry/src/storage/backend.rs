//! Shared exists/get/put logic on top of the `object_store` crate.

use futures_util::{StreamExt, TryStreamExt};
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::{ArtifactReader, ArtifactStream, StoreError};
use crate::coordinate::CacheKey;

/// One bucket or container of an `object_store` backend
#[derive(Debug, Clone)]
pub struct BlobBackend {
    name: &'static str,
    store: Arc<dyn ObjectStore>,
}

impl BlobBackend {
    pub fn new(name: &'static str, store: Arc<dyn ObjectStore>) -> Self {
        Self { name, store }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn failed(&self, key: &CacheKey, err: object_store::Error) -> StoreError {
        StoreError::Failed {
            backend: self.name,
            key: key.to_string(),
            source: Box::new(err),
        }
    }

    pub async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        match self.store.head(&ObjectPath::from(key.as_str())).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(self.failed(key, e)),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Result<ArtifactStream, StoreError> {
        let result = match self.store.get(&ObjectPath::from(key.as_str())).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StoreError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(self.failed(key, e)),
        };

        let backend = self.name;
        let key = key.to_string();
        Ok(result
            .into_stream()
            .map_err(move |e| StoreError::Failed {
                backend,
                key: key.clone(),
                source: Box::new(e),
            })
            .boxed())
    }

    /// Stream `body` into the store; small bodies go up in one request,
    /// large ones as a multipart upload that is aborted on failure.
    pub async fn put(
        &self,
        key: &CacheKey,
        mut body: ArtifactReader,
        content_type: &str,
    ) -> Result<u64, StoreError> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        let mut writer = BufWriter::new(Arc::clone(&self.store), ObjectPath::from(key.as_str()))
            .with_attributes(attributes);

        let written = match tokio::io::copy(&mut body, &mut writer).await {
            Ok(written) => written,
            Err(e) => {
                let _ = writer.abort().await;
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source: e,
                });
            }
        };

        if let Err(e) = writer.shutdown().await {
            let _ = writer.abort().await;
            return Err(StoreError::Failed {
                backend: self.name,
                key: key.to_string(),
                source: Box::new(e),
            });
        }

        Ok(written)
    }
}
