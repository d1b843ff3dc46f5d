//! Credential injection for git transports.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::source::{VcsCredential, PUBLIC_VCS_TYPE};

const HTTPS_SCHEME: &str = "https://";

/// Rewrite an HTTPS clone URL to carry `token` as `oauth2` basic auth.
///
/// `PUBLIC` sources, non-HTTPS URLs and empty tokens are left untouched.
pub fn inject_token(source_url: &str, vcs_type: &str, token: Option<&str>) -> String {
    match token {
        Some(token)
            if !token.is_empty()
                && vcs_type != PUBLIC_VCS_TYPE
                && source_url.starts_with(HTTPS_SCHEME) =>
        {
            source_url.replacen(HTTPS_SCHEME, &format!("https://oauth2:{}@", token), 1)
        }
        _ => source_url.to_string(),
    }
}

/// Clone URL for `credential`. SSH keys never alter the URL.
pub fn authenticated_url(source_url: &str, credential: &VcsCredential) -> String {
    inject_token(source_url, &credential.vcs_type(), credential.token())
}

/// Strip secrets carried by `credential` from diagnostic output
pub fn redact_secrets(output: &str, credential: &VcsCredential) -> String {
    match credential.token() {
        Some(token) => output.replace(token, "***"),
        None => output.to_string(),
    }
}

/// Private key written to disk for the lifetime of one clone.
///
/// Lives in its own temporary directory, never inside the checkout, so it can
/// not end up in a packaged archive.
#[derive(Debug)]
pub struct SshKeyFile {
    _dir: TempDir,
    path: PathBuf,
}

impl SshKeyFile {
    pub fn write(scratch_dir: &Path, key_type: &str, private_key: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("tfreg-ssh-")
            .tempdir_in(scratch_dir)?;
        let path = dir.path().join(format!("id_{}", sanitize_key_type(key_type)));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&path)?;
        file.write_all(private_key.as_bytes())?;
        // OpenSSH rejects keys without a final newline
        if !private_key.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.sync_all()?;

        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value for `GIT_SSH_COMMAND` using only this key.
    ///
    /// Host keys are accepted without verification, matching how registry
    /// clones have always behaved.
    pub fn ssh_command(&self) -> String {
        format!(
            "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null",
            shell_quote(&self.path.to_string_lossy())
        )
    }
}

fn sanitize_key_type(key_type: &str) -> String {
    let cleaned: String = key_type
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "key".to_string()
    } else {
        cleaned.to_lowercase()
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
