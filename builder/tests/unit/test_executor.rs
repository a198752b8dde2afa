//! Build executor tests

use std::sync::Arc;

use permadeploy::deploy::executor::{BuildExecutor, ExecutorOptions};
use permadeploy::deploy::sandbox::StepKind;
use permadeploy::errors::DeployError;
use permadeploy::models::deployment::DeploymentId;
use permadeploy::storage::layout::StorageLayout;

use crate::fakes::{request, Call, FakeRuntime};

fn executor(runtime: Arc<FakeRuntime>, layout: &StorageLayout) -> BuildExecutor {
    BuildExecutor::new(
        runtime,
        layout.clone(),
        ExecutorOptions {
            base_image: "node".to_string(),
            mirror_stdout: false,
        },
    )
}

fn assert_torn_down_once(runtime: &FakeRuntime) {
    assert_eq!(runtime.count(|c| matches!(c, Call::Create(_))), 1);
    assert_eq!(runtime.count(|c| matches!(c, Call::Stop(_))), 1);
    assert_eq!(runtime.count(|c| matches!(c, Call::Remove(_))), 1);
    assert_eq!(runtime.count(|c| matches!(c, Call::Prune)), 1);
}

#[tokio::test]
async fn test_successful_build_leaves_output_on_host() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(tmp.path());
    let runtime = Arc::new(FakeRuntime::with_site(&[
        ("index.html", "<html></html>"),
        ("assets/app.js", "console.log(1)"),
    ]));

    let output = executor(runtime.clone(), &layout)
        .run(DeploymentId::new(), &request("https://github.com/a/site"))
        .await
        .unwrap();

    assert_eq!(output.folder, "site");
    assert_eq!(output.dir.path(), layout.project_dir("site").subdir("dist").path());
    assert!(output.dir.file("assets/app.js").exists().await);

    let calls = runtime.calls();
    assert_eq!(calls[0], Call::EnsureImage("node".to_string()));
    assert!(matches!(calls[1], Call::Create(_)));
    assert!(matches!(calls[2], Call::Start(_)));
    assert!(calls.iter().any(|c| matches!(c, Call::Snapshot(_))));
    assert_torn_down_once(&runtime);

    let log = layout.log_file("site").read_string().await.unwrap();
    assert!(log.contains("running build"));
    assert!(log.contains("==> clone: git clone --depth 1 --branch main"));
}

#[tokio::test]
async fn test_missing_entry_point_fails_the_build() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(tmp.path());
    let runtime = Arc::new(FakeRuntime::with_site(&[("app.js", "console.log(1)")]));

    let err = executor(runtime.clone(), &layout)
        .run(DeploymentId::new(), &request("https://github.com/a/site"))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, DeployError::ArtifactMissing(_)));
    assert_eq!(err.to_string(), "index.html does not exist in build");
    assert_torn_down_once(&runtime);

    let log = layout.log_file("site").read_string().await.unwrap();
    assert!(log.ends_with("==> index.html does not exist in build\n"));
}

#[tokio::test]
async fn test_failing_step_stops_the_build() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(tmp.path());
    let runtime = Arc::new(
        FakeRuntime::with_site(&[("index.html", "<html></html>")])
            .failing_step(StepKind::Install, 1),
    );

    let err = executor(runtime.clone(), &layout)
        .run(DeploymentId::new(), &request("https://github.com/a/site"))
        .await
        .err()
        .unwrap();

    match err {
        DeployError::StepFailed { step, code } => {
            assert_eq!(step, "install");
            assert_eq!(code, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        runtime.count(|c| matches!(c, Call::Exec(_, StepKind::Build))),
        0
    );
    assert_eq!(runtime.count(|c| matches!(c, Call::Snapshot(_))), 0);
    assert_torn_down_once(&runtime);
}

#[tokio::test]
async fn test_start_failure_removes_the_sandbox() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(tmp.path());
    let runtime = Arc::new(FakeRuntime::default().failing_start());

    let err = executor(runtime.clone(), &layout)
        .run(DeploymentId::new(), &request("https://github.com/a/site"))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, DeployError::Provisioning(_)));
    assert_eq!(runtime.count(|c| matches!(c, Call::Remove(_))), 1);
    assert_eq!(runtime.count(|c| matches!(c, Call::Exec(..))), 0);
    assert_eq!(runtime.count(|c| matches!(c, Call::Stop(_))), 0);
    assert_eq!(runtime.count(|c| matches!(c, Call::Prune)), 1);
}

#[tokio::test]
async fn test_invalid_request_never_provisions() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(tmp.path());
    let runtime = Arc::new(FakeRuntime::default());

    let mut invalid = request("https://github.com/a/site");
    invalid.branch = "main; rm -rf /".to_string();

    let err = executor(runtime.clone(), &layout)
        .run(DeploymentId::new(), &invalid)
        .await
        .err()
        .unwrap();

    assert!(matches!(err, DeployError::Validation(_)));
    assert!(runtime.calls().is_empty());
}
