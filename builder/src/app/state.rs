//! Application state management

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::app::options::{AppOptions, StorageOptions};
use crate::coordinator::tracker::DeploymentTracker;
use crate::coordinator::DeploymentCoordinator;
use crate::deploy::docker::DockerRuntime;
use crate::deploy::executor::BuildExecutor;
use crate::deploy::sandbox::SandboxRuntime;
use crate::errors::DeployError;
use crate::http::client::HttpStorageClient;
use crate::publish::client::StorageClient;
use crate::publish::local::LocalStorage;
use crate::publish::publisher::ArtifactPublisher;
use crate::queue::admission::AdmissionQueue;
use crate::queue::store::FileQueueStore;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::StorageBackend;

const BUILD_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Main application state
pub struct AppState {
    pub coordinator: DeploymentCoordinator,
}

impl AppState {
    /// Initialize application state with the docker runtime
    pub async fn init(options: &AppOptions) -> Result<Self, DeployError> {
        Self::init_with_runtime(options, Arc::new(DockerRuntime::new())).await
    }

    /// Initialize application state around any sandbox runtime
    pub async fn init_with_runtime(
        options: &AppOptions,
        runtime: Arc<dyn SandboxRuntime>,
    ) -> Result<Self, DeployError> {
        info!("Initializing application state...");

        let layout = options.layout.clone();
        layout.setup(options.storage.backend).await?;

        let store = Arc::new(FileQueueStore::open(layout.queue_file()).await?);
        let queue = AdmissionQueue::new(options.capacity, store);

        let client = storage_client(&options.storage, &layout)?;
        let publisher = ArtifactPublisher::new(client, options.storage.strategy);
        let executor = BuildExecutor::new(runtime, layout.clone(), options.executor.clone());

        let coordinator = DeploymentCoordinator::new(
            queue,
            executor,
            publisher,
            Arc::new(DeploymentTracker::new()),
            layout,
        );

        Ok(Self { coordinator })
    }

    /// Wait up to `grace` for running builds. Queued deployments stay in
    /// the queue file and are resumed by the next start.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), DeployError> {
        let queue = self.coordinator.queue();
        queue.close();
        let deadline = Instant::now() + grace;

        while queue.active() > 0 && Instant::now() < deadline {
            debug!("Waiting for {} running builds...", queue.active());
            tokio::time::sleep(BUILD_POLL_INTERVAL).await;
        }

        let queued = queue.len().await.unwrap_or_default();
        match queue.active() {
            0 => info!("No builds running; {} queued deployments persisted", queued),
            running => warn!(
                "Abandoning {} running builds after {:?}; {} queued deployments persisted",
                running, grace, queued
            ),
        }
        Ok(())
    }
}

fn storage_client(
    options: &StorageOptions,
    layout: &StorageLayout,
) -> Result<Arc<dyn StorageClient>, DeployError> {
    match options.backend {
        StorageBackend::Http => {
            info!("Publishing through {}", options.node_url);
            Ok(Arc::new(HttpStorageClient::new(
                &options.node_url,
                options.token.clone(),
            )?))
        }
        StorageBackend::Local => {
            info!("Publishing to {}", layout.objects_dir().path().display());
            Ok(Arc::new(LocalStorage::new(layout.objects_dir())))
        }
    }
}
