//! Cloning module sources into ephemeral workspaces.
//!
//! A [`SourceFetcher`] turns a [`SourceDescriptor`] and a version into a
//! [`Workspace`]: a temporary checkout of exactly one tag. The workspace owns
//! its directory and removes it when dropped, so every exit path of the
//! caller releases it.

mod auth;
mod git;

pub use auth::{authenticated_url, inject_token, redact_secrets, SshKeyFile};
pub use git::GitFetcher;

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

use crate::source::SourceDescriptor;

#[derive(Error, Debug)]
pub enum CloneError {
    #[error("git clone of {url} at {reference} failed ({status}): {output}")]
    CloneFailed {
        url: String,
        reference: String,
        status: String,
        output: String,
    },

    #[error("Failed to execute git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Invalid module folder: {0}")]
    InvalidFolder(String),

    #[error("Module folder {0} not found in repository")]
    FolderNotFound(String),

    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

/// Produces a checkout of one module version
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Clone `source` at `tag_prefix + version` into a new directory under `scratch_dir`
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        version: &str,
        scratch_dir: &Path,
    ) -> Result<Workspace, CloneError>;
}

/// Temporary checkout owned by a single materialization call
#[derive(Debug)]
pub struct Workspace {
    _dir: TempDir,
    root: PathBuf,
    module_root: PathBuf,
}

impl Workspace {
    /// Wrap a checkout directory, resolving the optional module folder inside it
    pub fn new(dir: TempDir, folder: Option<&str>) -> Result<Self, CloneError> {
        let root = dir.path().to_path_buf();
        let module_root = resolve_module_root(&root, folder)?;
        Ok(Self {
            _dir: dir,
            root,
            module_root,
        })
    }

    /// Wrap a checkout living in the `name` subdirectory of `dir`.
    ///
    /// The subdirectory name becomes the top-level entry of the archive, so a
    /// stable name keeps archives of the same tag identical.
    pub fn nested(dir: TempDir, name: &str, folder: Option<&str>) -> Result<Self, CloneError> {
        let root = dir.path().join(name);
        let module_root = resolve_module_root(&root, folder)?;
        Ok(Self {
            _dir: dir,
            root,
            module_root,
        })
    }

    /// Root of the checkout
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that gets packaged
    pub fn module_root(&self) -> &Path {
        &self.module_root
    }
}

/// Join `folder` onto `root`, refusing anything that escapes the checkout.
///
/// A leading `/` is accepted since registry metadata commonly stores folders
/// that way.
pub fn resolve_module_root(root: &Path, folder: Option<&str>) -> Result<PathBuf, CloneError> {
    let folder = match folder.map(|f| f.trim_matches('/')) {
        Some(f) if !f.is_empty() => f,
        _ => return Ok(root.to_path_buf()),
    };

    let relative = Path::new(folder);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(CloneError::InvalidFolder(folder.to_string()));
    }

    // Every component must be a real directory; a symlink could point
    // outside the checkout
    let mut module_root = root.to_path_buf();
    for component in relative.components() {
        module_root.push(component);
        match std::fs::symlink_metadata(&module_root) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(CloneError::InvalidFolder(folder.to_string()));
            }
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(CloneError::FolderNotFound(folder.to_string())),
        }
    }
    Ok(module_root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_folder_is_root() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_module_root(dir.path(), None).unwrap(), dir.path());
        assert_eq!(resolve_module_root(dir.path(), Some("/")).unwrap(), dir.path());
    }

    #[test]
    fn test_folder_with_leading_slash() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("modules/vpc")).unwrap();

        let root = resolve_module_root(dir.path(), Some("/modules/vpc")).unwrap();
        assert_eq!(root, dir.path().join("modules/vpc"));
    }

    #[test]
    fn test_folder_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let result = resolve_module_root(dir.path(), Some("../etc"));
        assert!(matches!(result, Err(CloneError::InvalidFolder(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_folder_rejected() {
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "host file").unwrap();
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("modules")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("mod")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("modules/vpc")).unwrap();

        let result = resolve_module_root(dir.path(), Some("mod"));
        assert!(matches!(result, Err(CloneError::InvalidFolder(f)) if f == "mod"));
        let result = resolve_module_root(dir.path(), Some("/modules/vpc"));
        assert!(matches!(result, Err(CloneError::InvalidFolder(_))));
    }

    #[test]
    fn test_file_is_not_a_folder() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.tf"), "").unwrap();
        let result = resolve_module_root(dir.path(), Some("main.tf"));
        assert!(matches!(result, Err(CloneError::FolderNotFound(_))));
    }

    #[test]
    fn test_missing_folder() {
        let dir = TempDir::new().unwrap();
        let result = resolve_module_root(dir.path(), Some("nope"));
        assert!(matches!(result, Err(CloneError::FolderNotFound(f)) if f == "nope"));
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let scratch = TempDir::new().unwrap();
        let dir = tempfile::Builder::new()
            .prefix("ws-")
            .tempdir_in(scratch.path())
            .unwrap();
        std::fs::write(dir.path().join("main.tf"), "").unwrap();

        let workspace = Workspace::new(dir, None).unwrap();
        let root = workspace.root().to_path_buf();
        assert!(root.join("main.tf").exists());

        drop(workspace);
        assert!(!root.exists());
    }

    #[test]
    fn test_nested_workspace() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("vpc/modules/subnets")).unwrap();
        let outer = dir.path().to_path_buf();

        let workspace = Workspace::nested(dir, "vpc", Some("modules/subnets")).unwrap();
        assert_eq!(workspace.root(), outer.join("vpc"));
        assert_eq!(workspace.module_root(), outer.join("vpc/modules/subnets"));

        drop(workspace);
        assert!(!outer.exists());
    }
}
