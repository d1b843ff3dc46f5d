//! Where a module's source lives and how to authenticate against it.

use std::fmt;

/// VCS type used for repositories that need no credentials
pub const PUBLIC_VCS_TYPE: &str = "PUBLIC";

/// Prefix of the VCS type string for SSH key connections (`SSH~{keyType}`)
const SSH_VCS_PREFIX: &str = "SSH";

/// Credential used to clone a module repository
#[derive(Clone, PartialEq, Eq)]
pub enum VcsCredential {
    /// Anonymous access
    None,
    /// Token over HTTPS (GitHub, GitLab, Bitbucket, Azure DevOps, ...)
    Token {
        vcs_type: String,
        connection_type: Option<String>,
        token: String,
    },
    /// Private key handed to ssh
    SshKey {
        key_type: String,
        private_key: String,
    },
}

impl VcsCredential {
    /// VCS type string driving URL rewriting
    pub fn vcs_type(&self) -> String {
        match self {
            VcsCredential::None => PUBLIC_VCS_TYPE.to_string(),
            VcsCredential::Token { vcs_type, .. } => vcs_type.clone(),
            VcsCredential::SshKey { key_type, .. } => format!("{}~{}", SSH_VCS_PREFIX, key_type),
        }
    }

    /// Token to inject into HTTPS URLs, if any
    pub fn token(&self) -> Option<&str> {
        match self {
            VcsCredential::Token { token, .. } if !token.is_empty() => Some(token),
            _ => None,
        }
    }

    /// Whether the credential is an SSH key
    pub fn is_ssh(&self) -> bool {
        matches!(self, VcsCredential::SshKey { .. })
    }
}

impl Default for VcsCredential {
    fn default() -> Self {
        VcsCredential::None
    }
}

// Secrets stay out of logs and panics.
impl fmt::Debug for VcsCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcsCredential::None => f.write_str("None"),
            VcsCredential::Token { vcs_type, connection_type, .. } => f
                .debug_struct("Token")
                .field("vcs_type", vcs_type)
                .field("connection_type", connection_type)
                .field("token", &"***")
                .finish(),
            VcsCredential::SshKey { key_type, .. } => f
                .debug_struct("SshKey")
                .field("key_type", key_type)
                .field("private_key", &"***")
                .finish(),
        }
    }
}

/// Source of one module, resolved from registry metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Clone URL of the repository
    pub source_url: String,
    /// Optional sub-path of the module inside the repository
    pub folder: Option<String>,
    /// Prepended to the version to form the tag name
    pub tag_prefix: String,
    pub credential: VcsCredential,
}

impl SourceDescriptor {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            folder: None,
            tag_prefix: String::new(),
            credential: VcsCredential::None,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        let folder = folder.into();
        self.folder = if folder.is_empty() { None } else { Some(folder) };
        self
    }

    pub fn with_tag_prefix(mut self, tag_prefix: impl Into<String>) -> Self {
        self.tag_prefix = tag_prefix.into();
        self
    }

    pub fn with_credential(mut self, credential: VcsCredential) -> Self {
        self.credential = credential;
        self
    }

    /// Git ref checked out for `version`
    pub fn git_ref(&self, version: &str) -> String {
        format!("{}{}", self.tag_prefix, version)
    }
}
