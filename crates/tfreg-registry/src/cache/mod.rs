//! Lazily populated archive cache in object storage.
//!
//! [`MaterializationCache::materialize`] makes sure the archive of a module
//! coordinate exists in the store and returns its public download path. A
//! hit costs one metadata request against the store. A miss clones the tag,
//! packs the module directory and uploads the archive; later calls for the
//! same coordinate are hits from then on, including calls from other
//! registry instances sharing the store.

mod lease;

pub use lease::{KeyLease, KeyLeases};

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::archive::{ArchiveFile, Archiver, ZipArchiver};
use crate::coordinate::{CacheKey, ModuleCoordinate, ARCHIVE_CONTENT_TYPE};
use crate::error::{MaterializeError, Stage, StageError};
use crate::source::SourceDescriptor;
use crate::storage::{ArtifactStore, StoreError};
use crate::vcs::{GitFetcher, SourceFetcher};

pub struct MaterializationCache {
    store: Arc<dyn ArtifactStore>,
    fetcher: Arc<dyn SourceFetcher>,
    archiver: Arc<dyn Archiver>,
    hostname: String,
    scratch_dir: PathBuf,
    deadline: Option<Duration>,
    leases: KeyLeases,
}

impl MaterializationCache {
    /// Cache over `store` using git and zip, staging under the system temp dir
    pub fn new(store: Arc<dyn ArtifactStore>, hostname: impl Into<String>) -> Self {
        Self {
            store,
            fetcher: Arc::new(GitFetcher::new()),
            archiver: Arc::new(ZipArchiver::new()),
            hostname: hostname.into(),
            scratch_dir: std::env::temp_dir(),
            deadline: None,
            leases: KeyLeases::new(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = archiver;
        self
    }

    /// Directory holding workspaces, key files and archives while in flight
    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    /// Upper bound for one whole `materialize` call
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Ensure the archive of `coordinate` is stored and return its public path.
    ///
    /// Concurrent misses on one key inside this process are serialized; the
    /// second caller finds the archive already uploaded. Temporary files are
    /// released on every exit path, cancellation included.
    pub async fn materialize(
        &self,
        coordinate: &ModuleCoordinate,
        source: &SourceDescriptor,
    ) -> Result<String, MaterializeError> {
        let key = coordinate.cache_key();
        let public_path = coordinate.public_path(&self.hostname);
        let attempt = Attempt {
            coordinate,
            key: &key,
            deadline: self.deadline.map(|budget| (Instant::now() + budget, budget)),
        };

        if attempt.run(Stage::Lookup, self.store.exists(&key)).await? {
            log::debug!("coordinate={} key={} stage=lookup hit", coordinate, key);
            return Ok(public_path);
        }

        let _lease = attempt
            .run(Stage::Lookup, async {
                Ok::<_, StageError>(self.leases.acquire(&key).await)
            })
            .await?;

        if attempt.run(Stage::Lookup, self.store.exists(&key)).await? {
            log::debug!(
                "coordinate={} key={} stage=lookup hit after waiting for lease",
                coordinate,
                key
            );
            return Ok(public_path);
        }

        log::info!(
            "coordinate={} key={} stage=fetch ref={}",
            coordinate,
            key,
            source.git_ref(&coordinate.version)
        );
        let workspace = attempt
            .run(
                Stage::Fetch,
                self.fetcher.fetch(source, &coordinate.version, &self.scratch_dir),
            )
            .await?;

        log::debug!("coordinate={} key={} stage=pack", coordinate, key);
        let archiver = Arc::clone(&self.archiver);
        let scratch_dir = self.scratch_dir.clone();
        // The workspace moves into the task so it outlives packing even if
        // this call is cancelled meanwhile
        let packing = tokio::task::spawn_blocking(move || {
            let archive = archiver.pack(workspace.module_root(), &scratch_dir);
            drop(workspace);
            archive
        });
        let archive: ArchiveFile = attempt
            .run(Stage::Pack, async move {
                packing
                    .await
                    .map_err(|e| StageError::TaskFailed(e.to_string()))?
                    .map_err(StageError::from)
            })
            .await?;

        log::info!(
            "coordinate={} key={} stage=upload entries={} bytes={}",
            coordinate,
            key,
            archive.entries(),
            archive.size().unwrap_or_default()
        );
        attempt
            .run(Stage::Upload, async {
                let file = tokio::fs::File::open(archive.path())
                    .await
                    .map_err(|source| StoreError::Io {
                        key: key.to_string(),
                        source,
                    })?;
                self.store.put(&key, Box::new(file), ARCHIVE_CONTENT_TYPE).await
            })
            .await?;
        drop(archive);

        log::info!("coordinate={} key={} stage=done", coordinate, key);
        Ok(public_path)
    }
}

/// Per-call context shared by every stage
struct Attempt<'a> {
    coordinate: &'a ModuleCoordinate,
    key: &'a CacheKey,
    deadline: Option<(Instant, Duration)>,
}

impl Attempt<'_> {
    /// Await one stage within the remaining deadline, tagging failures
    async fn run<T, E, F>(&self, stage: Stage, step: F) -> Result<T, MaterializeError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<StageError>,
    {
        let result = match self.deadline {
            Some((at, budget)) => match tokio::time::timeout_at(at, step).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(StageError::DeadlineExceeded(budget)),
            },
            None => step.await.map_err(Into::into),
        };

        result.map_err(|source| {
            log::error!(
                "coordinate={} key={} stage={} error={}",
                self.coordinate,
                self.key,
                stage,
                source
            );
            MaterializeError {
                coordinate: self.coordinate.clone(),
                stage,
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ArtifactReader, ArtifactStream, BlobBackend};
    use crate::vcs::{CloneError, Workspace};
    use async_trait::async_trait;
    use futures_util::TryStreamExt;
    use object_store::memory::InMemory;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    const HOST: &str = "https://registry.example.com";

    /// In-memory store counting calls, optionally failing uploads
    struct CountingStore {
        backend: BlobBackend,
        exists_calls: AtomicUsize,
        puts: AtomicUsize,
        fail_puts: AtomicBool,
    }

    impl CountingStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                backend: BlobBackend::new("memory", Arc::new(InMemory::new())),
                exists_calls: AtomicUsize::new(0),
                puts: AtomicUsize::new(0),
                fail_puts: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl ArtifactStore for CountingStore {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
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
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.fail_puts.load(Ordering::SeqCst) {
                return Err(StoreError::Failed {
                    backend: "memory",
                    key: key.to_string(),
                    source: "quota exceeded".into(),
                });
            }
            self.backend.put(key, body, content_type).await
        }
    }

    /// Writes a small module tree instead of cloning
    struct FakeFetcher {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl FakeFetcher {
        fn new() -> Arc<Self> {
            Self::with(Duration::ZERO, false)
        }

        fn with(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail,
            })
        }
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        async fn fetch(
            &self,
            source: &SourceDescriptor,
            version: &str,
            scratch_dir: &Path,
        ) -> Result<Workspace, CloneError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let dir = tempfile::Builder::new()
                .prefix("tfreg-workspace-")
                .tempdir_in(scratch_dir)?;
            std::fs::write(dir.path().join("main.tf"), format!("# {}\n", version))?;
            tokio::time::sleep(self.delay).await;

            if self.fail {
                return Err(CloneError::CloneFailed {
                    url: source.source_url.clone(),
                    reference: source.git_ref(version),
                    status: "exit status: 128".to_string(),
                    output: "fatal: Remote branch not found".to_string(),
                });
            }
            Workspace::new(dir, source.folder.as_deref())
        }
    }

    fn coordinate() -> ModuleCoordinate {
        ModuleCoordinate::new("acme", "vpc", "aws", "1.0.0")
    }

    fn source() -> SourceDescriptor {
        SourceDescriptor::new("https://github.com/acme/vpc.git").with_tag_prefix("v")
    }

    fn cache(store: Arc<CountingStore>, fetcher: Arc<FakeFetcher>, scratch: &TempDir) -> MaterializationCache {
        MaterializationCache::new(store, HOST)
            .with_fetcher(fetcher)
            .with_scratch_dir(scratch.path())
    }

    fn scratch_is_empty(scratch: &TempDir) -> bool {
        std::fs::read_dir(scratch.path()).unwrap().count() == 0
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let scratch = TempDir::new().unwrap();
        let store = CountingStore::new();
        let fetcher = FakeFetcher::new();
        let cache = cache(store.clone(), fetcher.clone(), &scratch);

        let first = cache.materialize(&coordinate(), &source()).await.unwrap();
        assert_eq!(
            first,
            "https://registry.example.com/terraform/modules/v1/download/acme/vpc/aws/1.0.0/module.zip"
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);

        let second = cache.materialize(&coordinate(), &source()).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);

        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_stored_archive_is_a_zip() {
        let scratch = TempDir::new().unwrap();
        let store = CountingStore::new();
        let cache = cache(store.clone(), FakeFetcher::new(), &scratch);

        cache.materialize(&coordinate(), &source()).await.unwrap();

        let chunks: Vec<_> = store
            .get(&coordinate().cache_key())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let bytes = chunks.concat();
        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let names: Vec<String> = zip.file_names().map(str::to_string).collect();
        assert!(names.iter().any(|n| n.ends_with("/main.tf")));
        assert!(zip.by_index(0).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_key_absent() {
        let scratch = TempDir::new().unwrap();
        let store = CountingStore::new();
        let cache = cache(store.clone(), FakeFetcher::with(Duration::ZERO, true), &scratch);

        let err = cache.materialize(&coordinate(), &source()).await.unwrap_err();
        assert_eq!(err.stage, Stage::Fetch);
        assert_eq!(err.coordinate, coordinate());
        assert!(matches!(err.source, StageError::CloneFailed(CloneError::CloneFailed { .. })));

        assert!(!store.exists(&coordinate().cache_key()).await.unwrap());
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_key_absent() {
        let scratch = TempDir::new().unwrap();
        let store = CountingStore::new();
        store.fail_puts.store(true, Ordering::SeqCst);
        let cache = cache(store.clone(), FakeFetcher::new(), &scratch);

        let err = cache.materialize(&coordinate(), &source()).await.unwrap_err();
        assert_eq!(err.stage, Stage::Upload);
        assert!(matches!(err.source, StageError::ObjectStoreFailed(_)));

        assert!(!store.exists(&coordinate().cache_key()).await.unwrap());
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_missing_folder_fails_fetch() {
        let scratch = TempDir::new().unwrap();
        let cache = cache(CountingStore::new(), FakeFetcher::new(), &scratch);
        let source = source().with_folder("modules/missing");

        let err = cache.materialize(&coordinate(), &source).await.unwrap_err();
        assert_eq!(err.stage, Stage::Fetch);
        assert!(matches!(err.source, StageError::CloneFailed(CloneError::FolderNotFound(_))));
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_clone_once() {
        let scratch = TempDir::new().unwrap();
        let store = CountingStore::new();
        let fetcher = FakeFetcher::with(Duration::from_millis(100), false);
        let cache = Arc::new(cache(store.clone(), fetcher.clone(), &scratch));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.materialize(&coordinate(), &source()).await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        assert_eq!(cache.leases.active(), 0);
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_different_versions_materialize_independently() {
        let scratch = TempDir::new().unwrap();
        let store = CountingStore::new();
        let fetcher = FakeFetcher::new();
        let cache = cache(store.clone(), fetcher.clone(), &scratch);

        let first = coordinate();
        let mut next = coordinate();
        next.version = "1.1.0".to_string();
        let source = source();

        let (a, b) = tokio::join!(
            cache.materialize(&first, &source),
            cache.materialize(&next, &source)
        );
        assert_ne!(a.unwrap(), b.unwrap());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.puts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deadline_aborts_and_cleans_up() {
        let scratch = TempDir::new().unwrap();
        let store = CountingStore::new();
        let cache = cache(store.clone(), FakeFetcher::with(Duration::from_secs(30), false), &scratch)
            .with_deadline(Some(Duration::from_millis(50)));

        let err = cache.materialize(&coordinate(), &source()).await.unwrap_err();
        assert_eq!(err.stage, Stage::Fetch);
        assert!(matches!(err.source, StageError::DeadlineExceeded(d) if d == Duration::from_millis(50)));

        assert!(!store.exists(&coordinate().cache_key()).await.unwrap());
        assert!(scratch_is_empty(&scratch));
    }
}
