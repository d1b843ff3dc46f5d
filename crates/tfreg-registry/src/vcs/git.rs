//! Shallow tag clones through the `git` command-line client.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::auth::{authenticated_url, redact_secrets, SshKeyFile};
use super::{CloneError, SourceFetcher, Workspace};
use crate::source::{SourceDescriptor, VcsCredential};

/// Git fetcher backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitFetcher {
    /// Executable to run
    program: PathBuf,
    /// History depth requested from the remote
    depth: u32,
}

impl GitFetcher {
    /// Create a fetcher using `git` from `PATH`
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
            depth: 1,
        }
    }

    /// Use a specific git executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments for a shallow clone of `reference` into `dest`
    fn clone_args(&self, url: &str, reference: &str, dest: &Path) -> Vec<OsString> {
        vec![
            "clone".into(),
            "--depth".into(),
            self.depth.to_string().into(),
            "--branch".into(),
            reference.into(),
            "--".into(),
            url.into(),
            dest.as_os_str().to_owned(),
        ]
    }

    /// Environment of the git child: the ambient process environment,
    /// forwarded as-is so ssh-agent sockets and proxies keep working, plus
    /// the overrides a non-interactive clone needs.
    pub fn clone_env(ssh_key: Option<&SshKeyFile>) -> Vec<(OsString, OsString)> {
        let mut env: Vec<(OsString, OsString)> = std::env::vars_os()
            .filter(|(key, _)| key != "GIT_TERMINAL_PROMPT" && key != "GIT_SSH_COMMAND")
            .collect();

        env.push(("GIT_TERMINAL_PROMPT".into(), "0".into()));
        if let Some(key) = ssh_key {
            env.push(("GIT_SSH_COMMAND".into(), key.ssh_command().into()));
        }
        env
    }
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        version: &str,
        scratch_dir: &Path,
    ) -> Result<Workspace, CloneError> {
        let reference = source.git_ref(version);
        let url = authenticated_url(&source.source_url, &source.credential);

        // Dropped when this function returns, whatever the outcome
        let ssh_key = match &source.credential {
            VcsCredential::SshKey { key_type, private_key } => {
                Some(SshKeyFile::write(scratch_dir, key_type, private_key)?)
            }
            _ => None,
        };

        let dir = tempfile::Builder::new()
            .prefix("tfreg-workspace-")
            .tempdir_in(scratch_dir)?;
        let name = checkout_name(&source.source_url);

        log::debug!("Cloning {} at {}", source.source_url, reference);

        let output = Command::new(&self.program)
            .args(self.clone_args(&url, &reference, &dir.path().join(&name)))
            .env_clear()
            .envs(Self::clone_env(ssh_key.as_ref()))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(CloneError::Spawn)?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));

            return Err(CloneError::CloneFailed {
                url: source.source_url.clone(),
                reference,
                status: output.status.to_string(),
                output: redact_secrets(combined.trim(), &source.credential),
            });
        }

        Workspace::nested(dir, &name, source.folder.as_deref())
    }
}

/// Checkout directory name: the last path segment of the URL without `.git`
fn checkout_name(source_url: &str) -> String {
    let last = source_url
        .trim_end_matches('/')
        .rsplit(|c: char| c == '/' || c == ':')
        .next()
        .unwrap_or_default();
    let name = last.strip_suffix(".git").unwrap_or(last);

    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        "module".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_git_fetcher_creation() {
        let fetcher = GitFetcher::new();
        assert_eq!(fetcher.program, PathBuf::from("git"));
        assert_eq!(fetcher.depth, 1);
    }

    #[test]
    fn test_clone_args_are_shallow_at_ref() {
        let fetcher = GitFetcher::new();
        let args = fetcher.clone_args("https://github.com/o/r.git", "v1.2.3", Path::new("/tmp/ws"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(
            args,
            vec![
                "clone",
                "--depth",
                "1",
                "--branch",
                "v1.2.3",
                "--",
                "https://github.com/o/r.git",
                "/tmp/ws"
            ]
        );
    }

    #[test]
    fn test_checkout_name() {
        assert_eq!(checkout_name("https://github.com/acme/terraform-aws-vpc.git"), "terraform-aws-vpc");
        assert_eq!(checkout_name("git@github.com:acme/vpc.git"), "vpc");
        assert_eq!(checkout_name("https://dev.azure.com/acme/_git/vpc/"), "vpc");
        assert_eq!(checkout_name("file:///tmp/repo"), "repo");
        assert_eq!(checkout_name("https://example.com/.."), "module");
        assert_eq!(checkout_name(""), "module");
    }

    #[test]
    fn test_clone_env_forwards_ambient_environment() {
        let env = GitFetcher::clone_env(None);

        if let Some(path) = std::env::var_os("PATH") {
            assert!(env.iter().any(|(k, v)| k == "PATH" && *v == path));
        }
        assert!(env.iter().any(|(k, v)| k == "GIT_TERMINAL_PROMPT" && v == "0"));
        assert!(!env.iter().any(|(k, _)| k == "GIT_SSH_COMMAND"));
    }

    #[test]
    fn test_clone_env_with_ssh_key() {
        let scratch = TempDir::new().unwrap();
        let key = SshKeyFile::write(scratch.path(), "rsa", "KEY").unwrap();

        let env = GitFetcher::clone_env(Some(&key));
        let (_, command) = env
            .iter()
            .find(|(k, _)| k == "GIT_SSH_COMMAND")
            .expect("GIT_SSH_COMMAND set");
        assert!(command
            .to_string_lossy()
            .contains(&*key.path().to_string_lossy()));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let scratch = TempDir::new().unwrap();
        let fetcher = GitFetcher::new().with_program("/nonexistent/git-binary");
        let source = SourceDescriptor::new("https://github.com/o/r.git");

        let result = fetcher.fetch(&source, "1.0.0", scratch.path()).await;
        assert!(matches!(result, Err(CloneError::Spawn(_))));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_clone_public_repo() {
        let scratch = TempDir::new().unwrap();
        let fetcher = GitFetcher::new();
        let source = SourceDescriptor::new("https://github.com/octocat/Hello-World.git");

        // Hello-World has no tags, so the branch name is used as the version
        let workspace = fetcher.fetch(&source, "master", scratch.path()).await.unwrap();
        assert!(workspace.root().join("README").exists());
        assert!(workspace.root().ends_with("Hello-World"));
    }
}
