//! Router tests

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tower::ServiceExt;

use permadeploy::coordinator::tracker::DeploymentTracker;
use permadeploy::coordinator::DeploymentCoordinator;
use permadeploy::deploy::executor::{BuildExecutor, ExecutorOptions};
use permadeploy::github::push::TriggerPolicy;
use permadeploy::publish::publisher::{ArtifactPublisher, PublishStrategy};
use permadeploy::queue::admission::AdmissionQueue;
use permadeploy::queue::store::MemoryQueueStore;
use permadeploy::server::serve::router;
use permadeploy::server::state::ServerState;
use permadeploy::storage::layout::StorageLayout;

use crate::fakes::{wait_until, FakeRuntime, FakeStorage};

fn app(layout: &StorageLayout, runtime: FakeRuntime, capacity: usize) -> Router {
    app_with_coordinator(layout, runtime, capacity).0
}

fn app_with_coordinator(
    layout: &StorageLayout,
    runtime: FakeRuntime,
    capacity: usize,
) -> (Router, DeploymentCoordinator) {
    let coordinator = DeploymentCoordinator::new(
        AdmissionQueue::new(capacity, Arc::new(MemoryQueueStore::new())),
        BuildExecutor::new(
            Arc::new(runtime),
            layout.clone(),
            ExecutorOptions {
                base_image: "node".to_string(),
                mirror_stdout: false,
            },
        ),
        ArtifactPublisher::new(Arc::new(FakeStorage::default()), PublishStrategy::PathManifest),
        Arc::new(DeploymentTracker::new()),
        layout.clone(),
    );
    let router = router(Arc::new(ServerState::new(
        coordinator.clone(),
        "https://arweave.net/",
        TriggerPolicy::NonDefaultBranch,
    )));
    (router, coordinator)
}

fn site() -> FakeRuntime {
    FakeRuntime::with_site(&[("index.html", "<html></html>")])
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn deploy_body() -> Value {
    json!({
        "repository": "https://github.com/a/b",
        "branch": "main",
        "installCommand": "npm install",
        "buildCommand": "npm run build",
        "outputDir": "dist"
    })
}

#[tokio::test]
async fn test_health_routes() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&StorageLayout::new(tmp.path()), site(), 1);

    for uri in ["/", "/health"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["status"], "ready");
    }
}

#[tokio::test]
async fn test_deploy_missing_field_is_bad_request() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&StorageLayout::new(tmp.path()), site(), 1);

    let mut body = deploy_body();
    body.as_object_mut().unwrap().remove("repository");
    let response = app.oneshot(post_json("/deploy", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Repository is required");
}

#[tokio::test]
async fn test_deploy_waits_for_publish() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&StorageLayout::new(tmp.path()), site(), 1);

    let response = app.oneshot(post_json("/deploy", deploy_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    let manifest_id = body["manifestId"].as_str().unwrap();
    assert_eq!(body["url"], format!("https://arweave.net/{}", manifest_id));
}

#[tokio::test]
async fn test_deploy_failure_is_server_error() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = FakeRuntime::with_site(&[("app.js", "1")]);
    let app = app(&StorageLayout::new(tmp.path()), runtime, 1);

    let response = app.oneshot(post_json("/deploy", deploy_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "index.html does not exist in build");
}

#[tokio::test]
async fn test_queued_deploy_is_accepted_and_pollable() {
    let tmp = tempfile::tempdir().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let runtime = site().gated(gate.clone());
    let (app, coordinator) = app_with_coordinator(&StorageLayout::new(tmp.path()), runtime, 1);

    // Occupies the only slot until the gate opens.
    let first = tokio::spawn(app.clone().oneshot(post_json("/deploy", deploy_body())));
    assert!(wait_until(|| coordinator.queue().active() == 1).await);

    let response = app
        .clone()
        .oneshot(post_json("/deploy", deploy_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "queued");
    assert_eq!(body["position"], 1);

    let id = body["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(get(&format!("/deployments/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(record["state"], "queued");
    assert_eq!(record["project"], "b");

    gate.add_permits(2);
    let response = first.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_log_and_deployment() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&StorageLayout::new(tmp.path()), site(), 1);

    let response = app.clone().oneshot(get("/logs/nothing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Log not found");

    let response = app
        .clone()
        .oneshot(get("/deployments/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/deployments/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_push_to_default_branch_is_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&StorageLayout::new(tmp.path()), site(), 1);

    let notification = |git_ref: &str| {
        json!({
            "event": {
                "ref": git_ref,
                "repository": {
                    "name": "b",
                    "owner": { "login": "a" },
                    "default_branch": "main"
                }
            },
            "config": {
                "installCommand": "npm install",
                "buildCommand": "npm run build",
                "outputDir": "dist"
            }
        })
    };

    let response = app
        .clone()
        .oneshot(post_json("/push", notification("refs/heads/main")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(post_json("/push", notification("refs/heads/feature")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "started");
}
