//! Application wiring over a temp data dir

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_test::assert_ok;

use permadeploy::app::options::AppOptions;
use permadeploy::app::state::AppState;
use permadeploy::coordinator::SubmissionStatus;
use permadeploy::deploy::fsm::DeploymentState;
use permadeploy::models::deployment::DeploymentOutcome;
use permadeploy::publish::local::LocalStorage;
use permadeploy::queue::store::{FileQueueStore, QueueStore};
use permadeploy::storage::layout::StorageLayout;
use permadeploy::storage::settings::StorageBackend;

use crate::fakes::{request, wait_until, FakeRuntime};

fn local_options(dir: &std::path::Path) -> AppOptions {
    let mut options = AppOptions::default();
    options.layout = StorageLayout::new(dir);
    options.storage.backend = StorageBackend::Local;
    options.capacity = 1;
    options
}

#[tokio::test]
async fn test_local_backend_publishes_into_objects_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let options = local_options(tmp.path());
    let runtime = Arc::new(FakeRuntime::with_site(&[("index.html", "<html></html>")]));

    let state = AppState::init_with_runtime(&options, runtime).await.unwrap();

    let submission = state
        .coordinator
        .submit(request("https://github.com/acme/site"))
        .await
        .unwrap();
    let DeploymentOutcome::Published { id } = submission.result.wait().await else {
        panic!("deployment did not publish");
    };

    let objects = LocalStorage::new(options.layout.objects_dir());
    let manifest = String::from_utf8(objects.read(&id).await.unwrap()).unwrap();
    assert!(manifest.contains("index.html"));
    assert_ok!(state.shutdown(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_shutdown_returns_at_once_when_idle() {
    let tmp = tempfile::tempdir().unwrap();
    let options = local_options(tmp.path());
    let state = AppState::init_with_runtime(&options, Arc::new(FakeRuntime::default()))
        .await
        .unwrap();

    let started = Instant::now();
    assert_ok!(state.shutdown(Duration::from_secs(5)).await);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_shutdown_gives_up_on_running_builds_after_grace() {
    let tmp = tempfile::tempdir().unwrap();
    let options = local_options(tmp.path());
    let gate = Arc::new(Semaphore::new(0));
    let runtime = Arc::new(
        FakeRuntime::with_site(&[("index.html", "<html></html>")]).gated(gate.clone()),
    );
    let state = AppState::init_with_runtime(&options, runtime).await.unwrap();

    state
        .coordinator
        .submit(request("https://github.com/acme/slow"))
        .await
        .unwrap();
    assert!(wait_until(|| state.coordinator.queue().active() == 1).await);

    let started = Instant::now();
    assert_ok!(state.shutdown(Duration::from_millis(100)).await);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(state.coordinator.queue().active(), 1);

    gate.add_permits(1);
    assert!(wait_until(|| state.coordinator.queue().active() == 0).await);
}

#[tokio::test]
async fn test_shutdown_keeps_queued_deployment_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let options = local_options(tmp.path());
    let gate = Arc::new(Semaphore::new(0));
    let runtime = Arc::new(
        FakeRuntime::with_site(&[("index.html", "<html></html>")]).gated(gate.clone()),
    );
    let state = AppState::init_with_runtime(&options, runtime).await.unwrap();
    let coordinator = &state.coordinator;

    let running = coordinator
        .submit(request("https://github.com/acme/running"))
        .await
        .unwrap();
    assert_eq!(running.status, SubmissionStatus::Started);
    assert!(wait_until(|| coordinator.queue().active() == 1).await);
    let waiting = coordinator
        .submit(request("https://github.com/acme/waiting"))
        .await
        .unwrap();
    assert_eq!(waiting.status, SubmissionStatus::Queued { position: 1 });

    assert_ok!(state.shutdown(Duration::from_millis(100)).await);

    // The running build finishes after shutdown gave up on it.
    gate.add_permits(1);
    assert!(wait_until(|| coordinator.queue().active() == 0).await);
    assert!(matches!(
        running.result.wait().await,
        DeploymentOutcome::Published { .. }
    ));

    assert_eq!(
        coordinator.status(waiting.id).unwrap().state,
        DeploymentState::Queued
    );
    let persisted = FileQueueStore::open(options.layout.queue_file()).await.unwrap();
    let ids: Vec<_> = persisted
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    assert_eq!(ids, vec![waiting.id]);
}
