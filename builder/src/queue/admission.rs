//! Admission control for builds
//!
//! At most `capacity` builds hold a [`BuildSlot`] at any time. Requests that
//! arrive while every slot is taken wait in a durable FIFO store and are
//! handed the slot of the build that finishes next.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info};

use crate::errors::DeployError;
use crate::models::deployment::QueuedDeployment;
use crate::queue::store::QueueStore;

/// Permission to run one build. Dropping it frees the slot.
#[derive(Debug)]
pub struct BuildSlot {
    _permit: OwnedSemaphorePermit,
}

/// Result of [`AdmissionQueue::enqueue`]
#[derive(Debug)]
pub enum Admission {
    /// A slot was free; the build may start now
    Admitted(BuildSlot),

    /// Every slot is busy; the entry waits at `position` (1-based)
    Queued { position: usize },
}

/// Bounded-concurrency admission queue
pub struct AdmissionQueue {
    capacity: usize,
    slots: Arc<Semaphore>,
    store: Arc<dyn QueueStore>,
    // Held across admit/release/drain so the permit count and the store
    // change together.
    lock: Mutex<()>,
    // Once set, freed slots are not handed to queued entries.
    closed: AtomicBool,
}

impl AdmissionQueue {
    /// Create a queue with `capacity` slots (at least one)
    pub fn new(capacity: usize, store: Arc<dyn QueueStore>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            store,
            lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held
    pub fn active(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Stop starting queued entries. Waiting entries stay in the store for
    /// the next process; new entries are only persisted.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Admission closed, queued deployments stay persisted");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of entries waiting in the durable store
    pub async fn len(&self) -> Result<usize, DeployError> {
        self.store.len().await
    }

    /// Entries waiting in the durable store, head first
    pub async fn waiting(&self) -> Result<Vec<QueuedDeployment>, DeployError> {
        self.store.snapshot().await
    }

    /// Admit the entry if a slot is free and nothing is waiting, otherwise
    /// append it to the tail.
    ///
    /// A store failure is returned to the caller; nothing is dropped
    /// silently. An entry queued behind others while a slot is free is
    /// picked up by [`AdmissionQueue::resume`].
    pub async fn enqueue(&self, entry: QueuedDeployment) -> Result<Admission, DeployError> {
        let _guard = self.lock.lock().await;

        if !self.is_closed() && self.store.len().await? == 0 {
            if let Ok(permit) = self.slots.clone().try_acquire_owned() {
                debug!(
                    "Admitted deployment {} ({} / {} slots active)",
                    entry.id,
                    self.active(),
                    self.capacity
                );
                return Ok(Admission::Admitted(BuildSlot { _permit: permit }));
            }
        }

        let id = entry.id;
        self.store.push_back(entry).await?;
        let position = self.store.len().await?;
        info!(
            "Queued deployment {} at position {} ({} / {} slots active)",
            id,
            position,
            self.active(),
            self.capacity
        );
        Ok(Admission::Queued { position })
    }

    /// Give back a finished build's slot.
    ///
    /// If anything is waiting, the head of the queue inherits the slot and is
    /// returned for the caller to run; otherwise the slot is freed.
    pub async fn release(&self, slot: BuildSlot) -> Option<(QueuedDeployment, BuildSlot)> {
        let _guard = self.lock.lock().await;

        if self.is_closed() {
            drop(slot);
            return None;
        }

        match self.store.pop_front().await {
            Ok(Some(next)) => {
                debug!("Slot handed to queued deployment {}", next.id);
                Some((next, slot))
            }
            Ok(None) => {
                drop(slot);
                None
            }
            Err(e) => {
                error!("Failed to drain deployment queue: {}", e);
                drop(slot);
                None
            }
        }
    }

    /// Admit waiting entries, head first, up to the number of free slots.
    ///
    /// Covers entries persisted by a previous process and entries left
    /// waiting after a failed drain.
    pub async fn resume(&self) -> Vec<(QueuedDeployment, BuildSlot)> {
        let _guard = self.lock.lock().await;
        let mut resumed = Vec::new();
        if self.is_closed() {
            debug!("Admission closed, not resuming queued deployments");
            return resumed;
        }

        while let Ok(permit) = self.slots.clone().try_acquire_owned() {
            match self.store.pop_front().await {
                Ok(Some(entry)) => resumed.push((entry, BuildSlot { _permit: permit })),
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to resume deployment queue: {}", e);
                    break;
                }
            }
        }

        if !resumed.is_empty() {
            info!("Resuming {} queued deployments", resumed.len());
        }
        resumed
    }
}
