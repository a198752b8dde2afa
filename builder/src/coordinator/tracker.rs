//! Deployment status tracking and completion delivery
//!
//! Callers hold a [`ResultHandle`] keyed by the deployment's correlation id;
//! the durable queue never carries anything but the request itself.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tracing::warn;

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use crate::models::deployment::{DeploymentId, DeploymentOutcome};

/// Finished deployments kept for status queries
pub const DEFAULT_RETENTION: usize = 1024;

/// Snapshot of one deployment's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub project: String,
    #[serde(flatten)]
    pub state: DeploymentState,
    pub updated_at: DateTime<Utc>,
}

/// Broadcast on every state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentUpdate {
    pub id: DeploymentId,
    #[serde(flatten)]
    pub state: DeploymentState,
}

/// Awaitable terminal result of one deployment
#[derive(Debug)]
pub struct ResultHandle {
    id: DeploymentId,
    rx: oneshot::Receiver<DeploymentOutcome>,
}

impl ResultHandle {
    pub fn id(&self) -> DeploymentId {
        self.id
    }

    /// Wait for the deployment to publish or fail
    pub async fn wait(self) -> DeploymentOutcome {
        self.rx.await.unwrap_or_else(|_| DeploymentOutcome::Failed {
            message: format!("Deployment {} was abandoned", self.id),
        })
    }
}

struct Tracked {
    project: String,
    fsm: DeploymentFsm,
    waiters: Vec<oneshot::Sender<DeploymentOutcome>>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Records {
    entries: HashMap<DeploymentId, Tracked>,
    // Terminal ids, oldest first.
    finished: VecDeque<DeploymentId>,
}

/// Registry of deployment states and result waiters
///
/// Live deployments are always kept. Only the newest `retention` finished
/// ones stay queryable; older ones are forgotten.
pub struct DeploymentTracker {
    records: Mutex<Records>,
    updates: broadcast::Sender<DeploymentUpdate>,
    retention: usize,
}

impl DeploymentTracker {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            records: Mutex::new(Records::default()),
            updates,
            retention,
        }
    }

    /// Start tracking `id` in the queued state. No-op if already tracked.
    pub fn track(&self, id: DeploymentId, project: &str) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.entries.entry(id).or_insert_with(|| Tracked {
            project: project.to_string(),
            fsm: DeploymentFsm::new(),
            waiters: Vec::new(),
            updated_at: Utc::now(),
        });
    }

    /// Handle resolving once `id` reaches a terminal state
    pub fn result_handle(&self, id: DeploymentId) -> ResultHandle {
        let (tx, rx) = oneshot::channel();
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        match records.entries.get_mut(&id) {
            Some(tracked) => match outcome_of(tracked.fsm.state()) {
                Some(outcome) => {
                    let _ = tx.send(outcome);
                }
                None => tracked.waiters.push(tx),
            },
            None => {
                let _ = tx.send(DeploymentOutcome::Failed {
                    message: format!("Unknown deployment {}", id),
                });
            }
        }
        ResultHandle { id, rx }
    }

    /// Apply `event` to `id`, notifying waiters on a terminal state
    pub fn transition(&self, id: DeploymentId, event: DeploymentEvent) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tracked) = records.entries.get_mut(&id) else {
            warn!("Event {:?} for untracked deployment {}", event, id);
            return;
        };

        if let Err(e) = tracked.fsm.process(event) {
            warn!("Deployment {}: {}", id, e);
            return;
        }
        tracked.updated_at = Utc::now();

        let state = tracked.fsm.state().clone();
        if let Some(outcome) = outcome_of(&state) {
            for waiter in tracked.waiters.drain(..) {
                let _ = waiter.send(outcome.clone());
            }
            records.finished.push_back(id);
            while records.finished.len() > self.retention {
                if let Some(expired) = records.finished.pop_front() {
                    records.entries.remove(&expired);
                }
            }
        }
        // No subscribers is fine.
        let _ = self.updates.send(DeploymentUpdate { id, state });
    }

    /// Current record for `id`
    pub fn status(&self, id: DeploymentId) -> Option<DeploymentRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.entries.get(&id).map(|tracked| DeploymentRecord {
            id,
            project: tracked.project.clone(),
            state: tracked.fsm.state().clone(),
            updated_at: tracked.updated_at,
        })
    }

    /// Stream of state changes
    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentUpdate> {
        self.updates.subscribe()
    }
}

impl Default for DeploymentTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn outcome_of(state: &DeploymentState) -> Option<DeploymentOutcome> {
    match state {
        DeploymentState::Published { id } => Some(DeploymentOutcome::Published { id: id.clone() }),
        DeploymentState::Failed { message } => Some(DeploymentOutcome::Failed {
            message: message.clone(),
        }),
        _ => None,
    }
}
