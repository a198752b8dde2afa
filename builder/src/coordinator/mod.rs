//! Deployment coordinator
//!
//! Wires admission → build → publish for every submitted request and hands
//! each freed slot to the next queued deployment.

pub mod tracker;

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::deploy::executor::BuildExecutor;
use crate::deploy::fsm::DeploymentEvent;
use crate::errors::DeployError;
use crate::models::deployment::{
    folder_name, DeploymentId, DeploymentOutcome, DeploymentRequest, QueuedDeployment,
};
use crate::publish::publisher::ArtifactPublisher;
use crate::queue::admission::{Admission, AdmissionQueue, BuildSlot};
use crate::storage::layout::StorageLayout;
use crate::utils::version_info;

use self::tracker::{DeploymentRecord, DeploymentTracker, ResultHandle};

/// Returned by `get_log` when a project has never been built
pub const LOG_NOT_FOUND: &str = "Log not found";

/// Whether a submission started right away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubmissionStatus {
    Started,
    Queued { position: usize },
}

/// Accepted submission
#[derive(Debug)]
pub struct Submission {
    pub id: DeploymentId,
    pub status: SubmissionStatus,
    pub result: ResultHandle,
}

/// Contents of a project's build log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogText {
    Found(String),
    NotFound,
}

impl LogText {
    /// Log text, or the not-found sentinel
    pub fn into_text(self) -> String {
        match self {
            LogText::Found(text) => text,
            LogText::NotFound => LOG_NOT_FOUND.to_string(),
        }
    }
}

/// Static readiness indicator
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
    pub version: String,
}

struct Inner {
    queue: AdmissionQueue,
    executor: BuildExecutor,
    publisher: ArtifactPublisher,
    tracker: Arc<DeploymentTracker>,
    layout: StorageLayout,
}

/// Entry point for deployments
#[derive(Clone)]
pub struct DeploymentCoordinator {
    inner: Arc<Inner>,
}

impl DeploymentCoordinator {
    pub fn new(
        queue: AdmissionQueue,
        executor: BuildExecutor,
        publisher: ArtifactPublisher,
        tracker: Arc<DeploymentTracker>,
        layout: StorageLayout,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue,
                executor,
                publisher,
                tracker,
                layout,
            }),
        }
    }

    /// Validate and admit (or queue) a request.
    ///
    /// Validation failures consume nothing. A started deployment runs on its
    /// own task; a queued one runs when a slot frees up.
    pub async fn submit(&self, request: DeploymentRequest) -> Result<Submission, DeployError> {
        request.validate()?;

        let id = DeploymentId::new();
        let tracker = &self.inner.tracker;
        tracker.track(id, &request.folder_name());
        let result = tracker.result_handle(id);

        let entry = QueuedDeployment::new(id, request);
        let status = match self.inner.queue.enqueue(entry.clone()).await {
            Ok(Admission::Admitted(slot)) => {
                self.spawn(entry, slot);
                SubmissionStatus::Started
            }
            Ok(Admission::Queued { position }) => {
                // A slot may be free while older entries wait.
                self.resume().await;
                SubmissionStatus::Queued { position }
            }
            Err(e) => {
                tracker.transition(id, DeploymentEvent::Fail(e.to_string()));
                return Err(e);
            }
        };

        Ok(Submission { id, status, result })
    }

    /// Start waiting deployments on free slots, including those persisted by
    /// a previous process. Returns how many were started.
    pub async fn resume(&self) -> usize {
        let resumed = self.inner.queue.resume().await;
        let count = resumed.len();
        for (entry, slot) in resumed {
            self.spawn(entry, slot);
        }
        count
    }

    /// Current build log of a project. Unknown projects are not an error.
    pub async fn get_log(&self, project: &str) -> LogText {
        if project.is_empty() || project.contains(['/', '\\']) || project == ".." {
            return LogText::NotFound;
        }
        match self.inner.layout.log_file(project).read_bytes().await {
            Ok(bytes) => LogText::Found(String::from_utf8_lossy(&bytes).into_owned()),
            Err(_) => LogText::NotFound,
        }
    }

    pub fn health(&self) -> Health {
        Health {
            status: "ready",
            service: "permadeploy",
            version: version_info().version,
        }
    }

    pub fn status(&self, id: DeploymentId) -> Option<DeploymentRecord> {
        self.inner.tracker.status(id)
    }

    pub fn tracker(&self) -> &Arc<DeploymentTracker> {
        &self.inner.tracker
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.inner.queue
    }

    fn spawn(&self, entry: QueuedDeployment, slot: BuildSlot) {
        let inner = self.inner.clone();
        tokio::spawn(async move { Inner::drive(inner, entry, slot).await });
    }
}

impl Inner {
    /// Run `entry`, then keep running whatever inherits its slot
    async fn drive(self: Arc<Self>, entry: QueuedDeployment, slot: BuildSlot) {
        let mut next = Some((entry, slot));

        while let Some((entry, slot)) = next.take() {
            let id = entry.id;
            // Entries persisted by an earlier process are unknown here.
            self.tracker.track(id, &entry.request.folder_name());
            let task = tokio::spawn({
                let inner = self.clone();
                async move { inner.deploy(&entry).await }
            });
            if let Err(e) = task.await {
                error!("Deployment {} aborted: {}", id, e);
                self.tracker
                    .transition(id, DeploymentEvent::Fail(format!("Internal error: {}", e)));
            }

            next = self.queue.release(slot).await;
        }
    }

    async fn deploy(&self, entry: &QueuedDeployment) -> DeploymentOutcome {
        let id = entry.id;
        self.tracker.transition(id, DeploymentEvent::Admit);

        match self.build_and_publish(entry).await {
            Ok(published) => {
                self.tracker
                    .transition(id, DeploymentEvent::Published(published.clone()));
                DeploymentOutcome::Published { id: published }
            }
            Err(e) => {
                let message = e.to_string();
                error!(
                    "Deployment {} of {} failed: {}",
                    id,
                    folder_name(&entry.request.repository),
                    message
                );
                self.tracker.transition(id, DeploymentEvent::Fail(message.clone()));
                DeploymentOutcome::Failed { message }
            }
        }
    }

    async fn build_and_publish(&self, entry: &QueuedDeployment) -> Result<String, DeployError> {
        let mut output = self.executor.run(entry.id, &entry.request).await?;
        self.tracker.transition(entry.id, DeploymentEvent::BuildSucceeded);

        match self.publisher.publish(&output.dir, &mut output.log).await {
            Ok(report) => {
                info!(
                    "Deployment {} published as {} ({} files, {} skipped)",
                    entry.id,
                    report.id,
                    report.files.len(),
                    report.skipped.len()
                );
                Ok(report.id)
            }
            Err(e) => {
                let _ = output.log.line(&format!("==> Publish failed: {}", e)).await;
                Err(e.into())
            }
        }
    }
}
