use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use super::ConfigError;

/// Object storage service holding the module archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum StorageType {
    #[default]
    Aws,
    Azure,
    Gcp,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Aws => "AWS",
            StorageType::Azure => "AZURE",
            StorageType::Gcp => "GCP",
        }
    }
}

impl FromStr for StorageType {
    type Err = ConfigError;

    /// Accepts the short names and the historical implementation class names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" | "awsstorageimpl" => Ok(StorageType::Aws),
            "azure" | "azurestorageimpl" => Ok(StorageType::Azure),
            "gcp" | "gcpstorageimpl" => Ok(StorageType::Gcp),
            _ => Err(ConfigError::UnknownStorageType(s.to_string())),
        }
    }
}

impl TryFrom<String> for StorageType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// S3 bucket settings
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AwsStorageSettings {
    pub region: String,
    pub bucket_name: String,
    pub access_key: String,
    pub secret_key: String,
    /// Endpoint of an S3-compatible service
    pub endpoint: Option<String>,
}

impl Default for AwsStorageSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            bucket_name: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            endpoint: None,
        }
    }
}

impl fmt::Debug for AwsStorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsStorageSettings")
            .field("region", &self.region)
            .field("bucket_name", &self.bucket_name)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Azure blob container settings
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AzureStorageSettings {
    pub account_name: String,
    pub account_key: String,
    pub container_name: String,
}

impl fmt::Debug for AzureStorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureStorageSettings")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("container_name", &self.container_name)
            .finish()
    }
}

/// GCS bucket settings
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GcpStorageSettings {
    pub project_id: String,
    pub bucket_name: String,
    /// Service account JSON, or a path to it. Unset means application
    /// default credentials.
    pub credentials: Option<String>,
}

impl fmt::Debug for GcpStorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpStorageSettings")
            .field("project_id", &self.project_id)
            .field("bucket_name", &self.bucket_name)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Backend selection plus the settings of every backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    pub aws: AwsStorageSettings,
    pub azure: AzureStorageSettings,
    pub gcp: GcpStorageSettings,
}
