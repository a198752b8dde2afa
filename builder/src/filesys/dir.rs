//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::DeployError;
use crate::filesys::file::File;

/// A file found while walking a directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Absolute (or caller-rooted) path on disk
    pub path: PathBuf,

    /// Path relative to the walked root, `/` separated
    pub relative: String,

    /// Size in bytes
    pub size: u64,
}

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DeployError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DeployError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// Delete the directory if present and create it again empty
    pub async fn recreate(&self) -> Result<(), DeployError> {
        self.delete().await?;
        self.create().await
    }

    /// Recursively list every regular file below this directory.
    ///
    /// Entries are sorted by relative path. Symlinks are not followed.
    pub async fn walk_files(&self) -> Result<Vec<DirEntry>, DeployError> {
        let mut files = Vec::new();
        let mut pending = vec![self.path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let size = entry.metadata().await?.len();
                    let relative = relative_path(&self.path, &path)?;
                    files.push(DirEntry {
                        path,
                        relative,
                        size,
                    });
                }
            }
        }

        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(files)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}

fn relative_path(root: &Path, path: &Path) -> Result<String, DeployError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        DeployError::Internal(format!(
            "{} is not below {}",
            path.display(),
            root.display()
        ))
    })?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(segments.join("/"))
}
