//! Packaging module directories into zip archives.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to walk module tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Packs a directory tree into a single archive file
pub trait Archiver: Send + Sync {
    /// Pack `root` into a new archive created under `dest_dir`
    fn pack(&self, root: &Path, dest_dir: &Path) -> Result<ArchiveFile, ArchiveError>;
}

/// Archive on disk, removed when dropped
#[derive(Debug)]
pub struct ArchiveFile {
    file: NamedTempFile,
    entries: usize,
}

impl ArchiveFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Number of entries written, directories included
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn size(&self) -> io::Result<u64> {
        Ok(self.file.as_file().metadata()?.len())
    }
}

/// Deterministic zip packer.
///
/// Entries are named `{root name}/{relative path}` and visited in file name
/// order. Timestamps are pinned so identical trees produce identical bytes.
/// Symlinks and special files are skipped.
#[derive(Debug, Clone, Default)]
pub struct ZipArchiver;

impl ZipArchiver {
    pub fn new() -> Self {
        Self
    }

    fn write_tree<W: Write + io::Seek>(
        root: &Path,
        zip: &mut ZipWriter<W>,
    ) -> Result<usize, ArchiveError> {
        let base_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string());

        let mut entries = 0;
        for entry in WalkDir::new(root)
            .follow_links(false)
            .follow_root_links(false)
            .sort_by_file_name()
        {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let name = entry_name(&base_name, relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                zip.add_directory(format!("{}/", name), entry_options())?;
            } else if file_type.is_file() {
                let options = match unix_mode(&entry.metadata()?) {
                    Some(mode) => entry_options().unix_permissions(mode),
                    None => entry_options(),
                };
                zip.start_file(name, options)?;
                let mut file = File::open(entry.path())?;
                io::copy(&mut file, zip)?;
            } else {
                log::debug!("Skipping non-regular file {}", entry.path().display());
                continue;
            }
            entries += 1;
        }

        Ok(entries)
    }
}

impl Archiver for ZipArchiver {
    fn pack(&self, root: &Path, dest_dir: &Path) -> Result<ArchiveFile, ArchiveError> {
        // A symlinked root would pack whatever it points at
        let is_dir = std::fs::symlink_metadata(root)
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(ArchiveError::NotADirectory(root.to_path_buf()));
        }

        let mut file = tempfile::Builder::new()
            .prefix("tfreg-archive-")
            .suffix(".zip")
            .tempfile_in(dest_dir)?;

        let entries = {
            let mut zip = ZipWriter::new(BufWriter::new(file.as_file_mut()));
            let entries = Self::write_tree(root, &mut zip)?;
            zip.finish()?.flush()?;
            entries
        };
        file.as_file().sync_all()?;

        Ok(ArchiveFile { file, entries })
    }
}

/// Deflate with the zip epoch as timestamp
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

/// `base/rel/path` with forward slashes on every platform
fn entry_name(base_name: &str, relative: &Path) -> String {
    let mut name = base_name.to_string();
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

#[cfg(unix)]
fn unix_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn unix_mode(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}
