//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::storage::settings::StorageBackend;

/// On-disk layout of the builder's data directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Durable admission queue
    pub fn queue_file(&self) -> File {
        File::new(self.base_dir.join("queue.json"))
    }

    /// Parent of every project working directory
    pub fn builds_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("builds"))
    }

    /// Host working directory for one project, mounted into its sandbox
    pub fn project_dir(&self, folder: &str) -> Dir {
        self.builds_dir().subdir(folder)
    }

    /// Per-project build log, polled by `get_log`
    pub fn log_file(&self, folder: &str) -> File {
        self.project_dir(folder).file("log.txt")
    }

    /// Object store used by the local storage backend
    pub fn objects_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("objects"))
    }

    /// Create the directories `backend` needs
    pub async fn setup(&self, backend: StorageBackend) -> Result<(), DeployError> {
        self.builds_dir().create().await?;
        if backend == StorageBackend::Local {
            self.objects_dir().create().await?;
        }
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/permadeploy");

        #[cfg(not(target_os = "linux"))]
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".permadeploy");

        Self::new(base_dir)
    }
}

#[cfg(not(target_os = "linux"))]
mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}
