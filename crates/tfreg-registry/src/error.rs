use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::config::ConfigError;
use crate::coordinate::ModuleCoordinate;
use crate::metadata::MetadataError;
use crate::storage::StoreError;
use crate::vcs::CloneError;

/// Step of a materialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lookup,
    Fetch,
    Pack,
    Upload,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Lookup => "lookup",
            Stage::Fetch => "fetch",
            Stage::Pack => "pack",
            Stage::Upload => "upload",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage failed
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    CloneFailed(#[from] CloneError),

    #[error(transparent)]
    ArchiveFailed(#[from] ArchiveError),

    #[error(transparent)]
    ObjectStoreFailed(#[from] StoreError),

    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Packaging task failed: {0}")]
    TaskFailed(String),
}

#[derive(Error, Debug)]
#[error("Failed to materialize {coordinate} during {stage}")]
pub struct MaterializeError {
    pub coordinate: ModuleCoordinate,
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0} not found")]
    MetadataNotFound(String),

    #[error(transparent)]
    MetadataQueryFailed(MetadataError),

    #[error("Module archive not found: {0}")]
    ArchiveNotFound(ModuleCoordinate),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RegistryError {
    /// Whether the request named something that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::MetadataNotFound(_) | RegistryError::ArchiveNotFound(_)
        )
    }
}

impl From<MetadataError> for RegistryError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(what) => RegistryError::MetadataNotFound(what),
            other => RegistryError::MetadataQueryFailed(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
