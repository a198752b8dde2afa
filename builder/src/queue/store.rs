//! Durable FIFO storage for deployments waiting on a build slot

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::deployment::QueuedDeployment;

/// FIFO store backing the admission queue
///
/// Callers serialize access through the admission queue's lock; the
/// implementations only need to be internally consistent.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append an entry at the tail
    async fn push_back(&self, entry: QueuedDeployment) -> Result<(), DeployError>;

    /// Remove and return the head, if any
    async fn pop_front(&self) -> Result<Option<QueuedDeployment>, DeployError>;

    /// Number of waiting entries
    async fn len(&self) -> Result<usize, DeployError>;

    /// All waiting entries in FIFO order
    async fn snapshot(&self) -> Result<Vec<QueuedDeployment>, DeployError>;

    async fn is_empty(&self) -> Result<bool, DeployError> {
        Ok(self.len().await? == 0)
    }
}

/// In-process queue; entries are lost on restart
#[derive(Default)]
pub struct MemoryQueueStore {
    entries: Mutex<VecDeque<QueuedDeployment>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn push_back(&self, entry: QueuedDeployment) -> Result<(), DeployError> {
        self.entries.lock().await.push_back(entry);
        Ok(())
    }

    async fn pop_front(&self) -> Result<Option<QueuedDeployment>, DeployError> {
        Ok(self.entries.lock().await.pop_front())
    }

    async fn len(&self) -> Result<usize, DeployError> {
        Ok(self.entries.lock().await.len())
    }

    async fn snapshot(&self) -> Result<Vec<QueuedDeployment>, DeployError> {
        Ok(self.entries.lock().await.iter().cloned().collect())
    }
}

/// Queue persisted as a JSON array, rewritten atomically on every change
///
/// The in-memory copy is authoritative once loaded; a failed write leaves
/// both the file and the memory copy unchanged.
pub struct FileQueueStore {
    file: File,
    entries: Mutex<VecDeque<QueuedDeployment>>,
}

impl FileQueueStore {
    /// Open the queue file, loading any entries left by a previous process
    pub async fn open(file: File) -> Result<Self, DeployError> {
        let entries: VecDeque<QueuedDeployment> = if file.exists().await {
            match file.read_json::<Vec<QueuedDeployment>>().await {
                Ok(entries) => entries.into(),
                Err(e) => {
                    return Err(DeployError::Queue(format!(
                        "Unable to read queue file {}: {}",
                        file.path().display(),
                        e
                    )))
                }
            }
        } else {
            VecDeque::new()
        };

        if !entries.is_empty() {
            debug!(
                "Loaded {} queued deployments from {}",
                entries.len(),
                file.path().display()
            );
        }

        Ok(Self {
            file,
            entries: Mutex::new(entries),
        })
    }

    async fn persist(&self, entries: &VecDeque<QueuedDeployment>) -> Result<(), DeployError> {
        let list: Vec<&QueuedDeployment> = entries.iter().collect();
        self.file.write_json_atomic(&list).await.map_err(|e| {
            warn!("Failed to persist queue to {}: {}", self.file.path().display(), e);
            DeployError::Queue(e.to_string())
        })
    }
}

#[async_trait]
impl QueueStore for FileQueueStore {
    async fn push_back(&self, entry: QueuedDeployment) -> Result<(), DeployError> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.push_back(entry);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn pop_front(&self) -> Result<Option<QueuedDeployment>, DeployError> {
        let mut entries = self.entries.lock().await;
        if entries.is_empty() {
            return Ok(None);
        }
        let mut next = entries.clone();
        let head = next.pop_front();
        self.persist(&next).await?;
        *entries = next;
        Ok(head)
    }

    async fn len(&self) -> Result<usize, DeployError> {
        Ok(self.entries.lock().await.len())
    }

    async fn snapshot(&self) -> Result<Vec<QueuedDeployment>, DeployError> {
        Ok(self.entries.lock().await.iter().cloned().collect())
    }
}
