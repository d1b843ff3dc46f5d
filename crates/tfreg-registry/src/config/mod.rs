//! Registry configuration.
//!
//! Values are resolved in order: built-in defaults, an optional TOML file,
//! then environment variables. The environment variable names are the ones
//! existing registry deployments already set.

mod storage;

pub use storage::{
    AwsStorageSettings, AzureStorageSettings, GcpStorageSettings, StorageSettings, StorageType,
};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "tfreg.toml";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOSTNAME: &str = "http://localhost:8080";
pub const DEFAULT_API_URL: &str = "http://localhost:8081";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;
/// Bounds work left behind by clients that went away; `0` disables it
pub const DEFAULT_MATERIALIZE_TIMEOUT_SECS: u64 = 600;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },

    #[error("Unknown storage type: {0} (expected AWS, AZURE or GCP)")]
    UnknownStorageType(String),
}

/// Everything the registry needs at startup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Port the HTTP server listens on
    pub port: u16,
    /// Public base URL, prefixed to every download path
    pub hostname: String,
    /// GraphQL endpoint of the metadata service
    pub api_url: String,
    /// Timeout for metadata queries, in seconds
    pub api_timeout_secs: u64,
    /// Upper bound for one materialization, in seconds
    pub materialize_timeout_secs: Option<u64>,
    /// Where clones and archives are staged; the system temp dir when unset
    pub scratch_dir: Option<PathBuf>,
    pub storage: StorageSettings,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            hostname: DEFAULT_HOSTNAME.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            materialize_timeout_secs: Some(DEFAULT_MATERIALIZE_TIMEOUT_SECS),
            scratch_dir: None,
            storage: StorageSettings::default(),
        }
    }
}

impl RegistryConfig {
    /// Load from `path` (or `tfreg.toml` if present) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_with(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from variables returned by `lookup`. Empty values are
    /// treated as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.port = parse_number("PORT", &port)?;
        }
        if let Some(hostname) = get("AzBuilderRegistry") {
            self.hostname = hostname;
        }
        if let Some(api_url) = get("AzBuilderApiUrl") {
            self.api_url = api_url;
        }
        if let Some(timeout) = get("RegistryApiTimeout") {
            self.api_timeout_secs = parse_number("RegistryApiTimeout", &timeout)?;
        }
        if let Some(timeout) = get("RegistryMaterializeTimeout") {
            self.materialize_timeout_secs =
                Some(parse_number("RegistryMaterializeTimeout", &timeout)?);
        }
        if let Some(dir) = get("RegistryScratchDir") {
            self.scratch_dir = Some(PathBuf::from(dir));
        }

        let storage = &mut self.storage;
        if let Some(storage_type) = get("RegistryStorageType") {
            storage.storage_type = storage_type.parse()?;
        }

        let aws = &mut storage.aws;
        if let Some(v) = get("AwsStorageBucketName") {
            aws.bucket_name = v;
        }
        if let Some(v) = get("AwsStorageRegion") {
            aws.region = v;
        }
        if let Some(v) = get("AwsStorageAccessKey") {
            aws.access_key = v;
        }
        if let Some(v) = get("AwsStorageSecretKey") {
            aws.secret_key = v;
        }
        if let Some(v) = get("AwsEndpoint") {
            aws.endpoint = Some(v);
        }

        let azure = &mut storage.azure;
        if let Some(v) = get("AzureStorageAccountName") {
            azure.account_name = v;
        }
        if let Some(v) = get("AzureStorageAccountKey") {
            azure.account_key = v;
        }
        if let Some(v) = get("AzureStorageContainerName") {
            azure.container_name = v;
        }

        let gcp = &mut storage.gcp;
        if let Some(v) = get("GcpStorageProjectId") {
            gcp.project_id = v;
        }
        if let Some(v) = get("GcpStorageBucketName") {
            gcp.bucket_name = v;
        }
        if let Some(v) = get("GcpStorageCredentials") {
            gcp.credentials = Some(v);
        }

        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn materialize_timeout(&self) -> Option<Duration> {
        self.materialize_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}
