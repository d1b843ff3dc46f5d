//! Registry metadata: module versions and sources, provider releases.
//!
//! Metadata is owned by an upstream service; [`MetadataSource`] is the seam
//! the registry talks through and [`GraphQlMetadataClient`] the production
//! implementation.

mod graphql;

pub use graphql::{escape_filter_value, GraphQlMetadataClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::http::HttpError;
use crate::source::{SourceDescriptor, VcsCredential, PUBLIC_VCS_TYPE};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Metadata query failed: {0}")]
    QueryFailed(String),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Unexpected metadata response: {0}")]
    InvalidResponse(String),
}

/// Read-only view of the registry metadata
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Published versions of a module
    async fn module_versions(
        &self,
        organization: &str,
        name: &str,
        provider: &str,
    ) -> Result<Vec<String>, MetadataError>;

    /// Where a module's source lives
    async fn module_details(
        &self,
        organization: &str,
        name: &str,
        provider: &str,
    ) -> Result<ModuleDetails, MetadataError>;

    /// Published versions of a provider with their platforms
    async fn provider_versions(
        &self,
        organization: &str,
        provider: &str,
    ) -> Result<Vec<ProviderVersion>, MetadataError>;

    /// Download descriptor of one provider build
    async fn provider_file(
        &self,
        organization: &str,
        provider: &str,
        version: &str,
        os: &str,
        arch: &str,
    ) -> Result<ProviderFile, MetadataError>;
}

/// Module source as stored upstream
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleDetails {
    pub source: String,
    pub folder: Option<String>,
    pub tag_prefix: Option<String>,
    pub vcs: Option<VcsConnection>,
    pub ssh: Option<SshConnection>,
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VcsConnection {
    pub vcs_type: String,
    pub connection_type: Option<String>,
    pub access_token: Option<String>,
    pub client_id: Option<String>,
}

impl fmt::Debug for VcsConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VcsConnection")
            .field("vcs_type", &self.vcs_type)
            .field("connection_type", &self.connection_type)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SshConnection {
    pub ssh_type: String,
    pub private_key: String,
}

impl fmt::Debug for SshConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConnection")
            .field("ssh_type", &self.ssh_type)
            .field("private_key", &"***")
            .finish()
    }
}

impl ModuleDetails {
    /// Clone instructions for this module.
    ///
    /// A VCS connection wins over an SSH one; neither means anonymous access.
    pub fn source_descriptor(&self) -> SourceDescriptor {
        let credential = match (&self.vcs, &self.ssh) {
            (Some(vcs), _) if vcs.vcs_type != PUBLIC_VCS_TYPE => VcsCredential::Token {
                vcs_type: vcs.vcs_type.clone(),
                connection_type: vcs.connection_type.clone(),
                token: vcs.access_token.clone().unwrap_or_default(),
            },
            (Some(_), _) => VcsCredential::None,
            (None, Some(ssh)) => VcsCredential::SshKey {
                key_type: ssh.ssh_type.clone(),
                private_key: ssh.private_key.clone(),
            },
            (None, None) => VcsCredential::None,
        };

        SourceDescriptor::new(self.source.clone())
            .with_folder(self.folder.clone().unwrap_or_default())
            .with_tag_prefix(self.tag_prefix.clone().unwrap_or_default())
            .with_credential(credential)
    }
}

/// One build target of a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

/// Provider release as listed by the versions endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderVersion {
    pub version: String,
    pub protocols: Vec<String>,
    pub platforms: Vec<Platform>,
}

/// Download descriptor of one provider build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFile {
    pub protocols: Vec<String>,
    pub os: String,
    pub arch: String,
    pub filename: String,
    pub download_url: String,
    pub shasums_url: String,
    pub shasums_signature_url: String,
    pub shasum: String,
    pub signing_keys: SigningKeys,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SigningKeys {
    pub gpg_public_keys: Vec<GpgPublicKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GpgPublicKey {
    pub key_id: String,
    pub ascii_armor: String,
    pub trust_signature: String,
    pub source: String,
    pub source_url: String,
}

/// Split the comma separated protocol list stored upstream
pub fn split_protocols(protocols: &str) -> Vec<String> {
    protocols
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
