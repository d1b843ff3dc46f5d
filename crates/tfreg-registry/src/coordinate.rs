//! Module coordinates and the names derived from them.

use std::fmt;

/// Content type of every stored module archive
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Identifies one packaged module artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleCoordinate {
    pub organization: String,
    pub name: String,
    pub provider: String,
    pub version: String,
}

impl ModuleCoordinate {
    pub fn new(
        organization: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            name: name.into(),
            provider: provider.into(),
            version: version.into(),
        }
    }

    /// Storage key of the archive for this coordinate
    pub fn cache_key(&self) -> CacheKey {
        CacheKey(format!(
            "registry/{}/{}/{}/{}/module.zip",
            self.organization, self.name, self.provider, self.version
        ))
    }

    /// Public download URL handed to Terraform via `X-Terraform-Get`.
    ///
    /// Independent of the storage backend; a trailing slash on `hostname` is ignored.
    pub fn public_path(&self, hostname: &str) -> String {
        format!(
            "{}/terraform/modules/v1/download/{}/{}/{}/{}/module.zip",
            hostname.trim_end_matches('/'),
            self.organization,
            self.name,
            self.provider,
            self.version
        )
    }

    /// File name offered in the `Content-Disposition` of an archive download
    pub fn archive_file_name(&self) -> String {
        format!(
            "{}-{}-{}-{}.zip",
            self.organization, self.name, self.provider, self.version
        )
    }
}

impl fmt::Display for ModuleCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.organization, self.name, self.provider, self.version
        )
    }
}

/// Deterministic storage key, one per coordinate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
