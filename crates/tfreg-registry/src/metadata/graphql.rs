//! GraphQL client for the upstream metadata service.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    split_protocols, GpgPublicKey, MetadataError, MetadataSource, ModuleDetails, Platform,
    ProviderFile, ProviderVersion, SigningKeys,
};
use crate::http::{HttpClient, HttpClientConfig};

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

/// Relay style `{edges: [{node}]}` list
#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<Edge<T>>,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self { edges: Vec::new() }
    }
}

impl<T> Connection<T> {
    fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|edge| &edge.node)
    }

    fn into_nodes(self) -> impl Iterator<Item = T> {
        self.edges.into_iter().map(|edge| edge.node)
    }
}

#[derive(Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct OrganizationData<T> {
    #[serde(default)]
    organization: Connection<T>,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ModuleOrganization<T> {
    #[serde(default)]
    module: Connection<T>,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ProviderOrganization<T> {
    #[serde(default)]
    provider: Connection<T>,
}

#[derive(Deserialize)]
struct ModuleVersionsNode {
    #[serde(default)]
    version: Connection<ModuleVersionNode>,
}

#[derive(Deserialize)]
struct ModuleVersionNode {
    version: String,
}

#[derive(Deserialize)]
struct ProviderNode {
    #[serde(default)]
    version: Connection<ProviderVersionNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderVersionNode {
    #[serde(default)]
    version_number: String,
    #[serde(default)]
    protocols: Option<String>,
    #[serde(default)]
    implementation: Connection<ImplementationNode>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ImplementationNode {
    os: String,
    arch: String,
    filename: String,
    download_url: String,
    shasums_url: String,
    shasums_signature_url: String,
    shasum: String,
    key_id: String,
    ascii_armor: String,
    trust_signature: String,
    source: String,
    source_url: String,
}

/// Escape a value embedded in a double-quoted filter argument
pub fn escape_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Whether `value` can be compared in a filter as-is.
///
/// Registry names and versions never contain filter operators such as `;`,
/// `,`, `==` or parentheses, so anything outside this set names nothing.
fn is_plain_filter_value(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
}

fn require_plain(values: &[&str], not_found: impl FnOnce() -> String) -> Result<(), MetadataError> {
    if values.iter().all(|v| is_plain_filter_value(v)) {
        Ok(())
    } else {
        Err(MetadataError::NotFound(not_found()))
    }
}

fn module_versions_query(organization: &str, name: &str, provider: &str) -> String {
    format!(
        r#"{{ organization(filter: "name=={}") {{ edges {{ node {{ id name module(filter: "name=={};provider=={}") {{ edges {{ node {{ id name provider version {{ edges {{ node {{ id version }} }} }} }} }} }} }} }} }} }}"#,
        escape_filter_value(organization),
        escape_filter_value(name),
        escape_filter_value(provider),
    )
}

fn module_details_query(organization: &str, name: &str, provider: &str) -> String {
    format!(
        r#"{{ organization(filter: "name=={}") {{ edges {{ node {{ id module(filter: "name=={};provider=={}") {{ edges {{ node {{ id source folder tagPrefix vcs {{ id vcsType connectionType accessToken clientId }} ssh {{ id sshType privateKey }} }} }} }} }} }} }} }}"#,
        escape_filter_value(organization),
        escape_filter_value(name),
        escape_filter_value(provider),
    )
}

fn provider_versions_query(organization: &str, provider: &str) -> String {
    format!(
        r#"{{ organization(filter: "name=={}") {{ edges {{ node {{ id name provider(filter: "name=={}") {{ edges {{ node {{ id name version {{ edges {{ node {{ id versionNumber protocols implementation {{ edges {{ node {{ id os arch }} }} }} }} }} }} }} }} }} }} }} }} }}"#,
        escape_filter_value(organization),
        escape_filter_value(provider),
    )
}

fn provider_file_query(
    organization: &str,
    provider: &str,
    version: &str,
    os: &str,
    arch: &str,
) -> String {
    format!(
        r#"{{ organization(filter: "name=={}") {{ edges {{ node {{ id provider(filter: "name=={}") {{ edges {{ node {{ id version(filter: "versionNumber=={}") {{ edges {{ node {{ id protocols implementation(filter: "os=={};arch=={}") {{ edges {{ node {{ id os arch filename downloadUrl shasumsUrl shasumsSignatureUrl shasum keyId asciiArmor trustSignature source sourceUrl }} }} }} }} }} }} }} }} }} }} }} }} }}"#,
        escape_filter_value(organization),
        escape_filter_value(provider),
        escape_filter_value(version),
        escape_filter_value(os),
        escape_filter_value(arch),
    )
}

/// [`MetadataSource`] backed by the GraphQL API
#[derive(Debug, Clone)]
pub struct GraphQlMetadataClient {
    http: HttpClient,
    endpoint: String,
}

impl GraphQlMetadataClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, MetadataError> {
        let http = HttpClient::with_config(HttpClientConfig::new().with_timeout(timeout))
            .map_err(|e| MetadataError::Http(e.into()))?;
        Ok(Self::with_client(http, endpoint))
    }

    pub fn with_client(http: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run `query` and return its `data`; the first GraphQL error wins
    async fn query<T: DeserializeOwned>(&self, query: &str) -> Result<T, MetadataError> {
        let response: GraphQlResponse<T> = self
            .http
            .post_json(&self.endpoint, &GraphQlRequest { query })
            .await?;

        if let Some(error) = response.errors.into_iter().next() {
            return Err(MetadataError::QueryFailed(error.message));
        }

        response
            .data
            .ok_or_else(|| MetadataError::InvalidResponse("response has no data".to_string()))
    }
}

#[async_trait]
impl MetadataSource for GraphQlMetadataClient {
    async fn module_versions(
        &self,
        organization: &str,
        name: &str,
        provider: &str,
    ) -> Result<Vec<String>, MetadataError> {
        require_plain(&[organization, name, provider], || {
            format!("Module {}/{}/{}", organization, name, provider)
        })?;
        let data: OrganizationData<ModuleOrganization<ModuleVersionsNode>> = self
            .query(&module_versions_query(organization, name, provider))
            .await?;

        let module = data
            .organization
            .into_nodes()
            .flat_map(|org| org.module.into_nodes())
            .next()
            .ok_or_else(|| {
                MetadataError::NotFound(format!("Module {}/{}/{}", organization, name, provider))
            })?;

        let versions: Vec<String> = module.version.into_nodes().map(|v| v.version).collect();
        log::debug!(
            "Found {} versions for {}/{}/{}",
            versions.len(),
            organization,
            name,
            provider
        );
        Ok(versions)
    }

    async fn module_details(
        &self,
        organization: &str,
        name: &str,
        provider: &str,
    ) -> Result<ModuleDetails, MetadataError> {
        require_plain(&[organization, name, provider], || {
            format!("Module {}/{}/{}", organization, name, provider)
        })?;
        let data: OrganizationData<ModuleOrganization<ModuleDetails>> = self
            .query(&module_details_query(organization, name, provider))
            .await?;

        data.organization
            .into_nodes()
            .flat_map(|org| org.module.into_nodes())
            .next()
            .ok_or_else(|| {
                MetadataError::NotFound(format!("Module {}/{}/{}", organization, name, provider))
            })
    }

    async fn provider_versions(
        &self,
        organization: &str,
        provider: &str,
    ) -> Result<Vec<ProviderVersion>, MetadataError> {
        require_plain(&[organization, provider], || {
            format!("Provider {}/{}", organization, provider)
        })?;
        let data: OrganizationData<ProviderOrganization<ProviderNode>> = self
            .query(&provider_versions_query(organization, provider))
            .await?;

        let provider_node = data
            .organization
            .into_nodes()
            .flat_map(|org| org.provider.into_nodes())
            .next()
            .ok_or_else(|| MetadataError::NotFound(format!("Provider {}/{}", organization, provider)))?;

        Ok(provider_node
            .version
            .into_nodes()
            .map(|version| ProviderVersion {
                protocols: split_protocols(version.protocols.as_deref().unwrap_or_default()),
                platforms: version
                    .implementation
                    .nodes()
                    .map(|i| Platform {
                        os: i.os.clone(),
                        arch: i.arch.clone(),
                    })
                    .collect(),
                version: version.version_number,
            })
            .collect())
    }

    async fn provider_file(
        &self,
        organization: &str,
        provider: &str,
        version: &str,
        os: &str,
        arch: &str,
    ) -> Result<ProviderFile, MetadataError> {
        let describe = || {
            format!(
                "Provider {}/{} {} for {}/{}",
                organization, provider, version, os, arch
            )
        };
        require_plain(&[organization, provider, version, os, arch], describe)?;

        let data: OrganizationData<ProviderOrganization<ProviderNode>> = self
            .query(&provider_file_query(organization, provider, version, os, arch))
            .await?;

        let not_found = || MetadataError::NotFound(describe());

        let release = data
            .organization
            .into_nodes()
            .flat_map(|org| org.provider.into_nodes())
            .flat_map(|p| p.version.into_nodes())
            .next()
            .ok_or_else(not_found)?;

        let protocols = split_protocols(release.protocols.as_deref().unwrap_or_default());
        let build = release
            .implementation
            .into_nodes()
            .next()
            .ok_or_else(not_found)?;

        Ok(ProviderFile {
            protocols,
            os: build.os,
            arch: build.arch,
            filename: build.filename,
            download_url: build.download_url,
            shasums_url: build.shasums_url,
            shasums_signature_url: build.shasums_signature_url,
            shasum: build.shasum,
            signing_keys: SigningKeys {
                gpg_public_keys: vec![GpgPublicKey {
                    key_id: build.key_id,
                    ascii_armor: build.ascii_armor,
                    trust_signature: build.trust_signature,
                    source: build.source,
                    source_url: build.source_url,
                }],
            },
        })
    }
}
