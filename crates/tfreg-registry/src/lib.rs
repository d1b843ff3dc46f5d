pub mod archive;
pub mod cache;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod http;
pub mod metadata;
pub mod service;
pub mod source;
pub mod storage;
pub mod vcs;

pub use archive::{ArchiveError, ArchiveFile, Archiver, ZipArchiver};
pub use cache::MaterializationCache;
pub use config::{ConfigError, RegistryConfig, StorageSettings, StorageType};
pub use coordinate::{CacheKey, ModuleCoordinate, ARCHIVE_CONTENT_TYPE};
pub use error::{MaterializeError, RegistryError, Result, Stage, StageError};
pub use metadata::{GraphQlMetadataClient, MetadataError, MetadataSource};
pub use service::RegistryService;
pub use source::{SourceDescriptor, VcsCredential};
pub use storage::{connect_store, ArtifactStore, ArtifactStream, StoreError};
pub use vcs::{CloneError, GitFetcher, SourceFetcher, Workspace};
