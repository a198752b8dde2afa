//! Artifact publisher tests

use std::sync::Arc;

use permadeploy::deploy::log::BuildLog;
use permadeploy::errors::PublishError;
use permadeploy::filesys::dir::Dir;
use permadeploy::filesys::file::File;
use permadeploy::publish::client::Tag;
use permadeploy::publish::local::LocalStorage;
use permadeploy::publish::manifest::{PathManifest, MANIFEST_CONTENT_TYPE};
use permadeploy::publish::publisher::{ArtifactPublisher, PublishStrategy};

use crate::fakes::FakeStorage;

async fn site(root: &std::path::Path, files: &[(&str, &str)]) -> Dir {
    let dir = Dir::new(root.join("dist"));
    for (path, body) in files {
        dir.file(path).write_string(body).await.unwrap();
    }
    dir
}

async fn log(root: &std::path::Path) -> BuildLog {
    BuildLog::create(&File::new(root.join("log.txt")), false)
        .await
        .unwrap()
}

fn manifest_of(storage: &FakeStorage, id: &str) -> PathManifest {
    let (body, tags) = storage.object(id).expect("manifest should be stored");
    assert_eq!(tags, vec![Tag::content_type(MANIFEST_CONTENT_TYPE)]);
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_publish_rewrites_entry_point_and_builds_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = site(
        tmp.path(),
        &[
            ("index.html", r#"<html><script src="/app.js"></script></html>"#),
            ("app.js", "console.log('hi')"),
        ],
    )
    .await;
    let storage = Arc::new(FakeStorage::default());
    let publisher = ArtifactPublisher::new(storage.clone(), PublishStrategy::PathManifest);

    let report = publisher.publish(&dir, &mut log(tmp.path()).await).await.unwrap();

    let manifest = manifest_of(&storage, &report.id);
    assert_eq!(manifest.index.path, "index.html");
    assert_eq!(manifest.len(), 2);

    let (index, tags) = storage.object(&manifest.paths["index.html"].id).unwrap();
    assert_eq!(
        String::from_utf8(index).unwrap(),
        r#"<html><script src="./app.js"></script></html>"#
    );
    assert_eq!(tags, vec![Tag::content_type("text/html")]);

    let (app, tags) = storage.object(&manifest.paths["app.js"].id).unwrap();
    assert_eq!(app, b"console.log('hi')");
    assert_eq!(tags, vec![Tag::content_type("application/javascript")]);

    assert!(report.skipped.is_empty());
    assert_eq!(report.cost, Some(report.total_bytes * 10));
    assert!(!dir.exists().await);
}

#[tokio::test]
async fn test_latin1_entry_point_is_rewritten_byte_for_byte() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = site(tmp.path(), &[("logo.png", "png")]).await;
    dir.file("index.html")
        .write_bytes(b"<p>caf\xe9</p><img src=\"/logo.png\">")
        .await
        .unwrap();
    let storage = Arc::new(FakeStorage::default());
    let publisher = ArtifactPublisher::new(storage.clone(), PublishStrategy::PathManifest);

    let report = publisher.publish(&dir, &mut log(tmp.path()).await).await.unwrap();

    let manifest = manifest_of(&storage, &report.id);
    let (index, _) = storage.object(&manifest.paths["index.html"].id).unwrap();
    assert_eq!(index, b"<p>caf\xe9</p><img src=\"./logo.png\">".to_vec());
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_failed_file_upload_is_left_out_of_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = site(
        tmp.path(),
        &[
            ("index.html", "<html></html>"),
            ("a.css", "body {}"),
            ("b.js", "REJECT me"),
            ("c.txt", "hello"),
            ("img/d.svg", "<svg/>"),
        ],
    )
    .await;
    let storage = Arc::new(FakeStorage::rejecting("REJECT"));
    let publisher = ArtifactPublisher::new(storage.clone(), PublishStrategy::PathManifest);

    let report = publisher.publish(&dir, &mut log(tmp.path()).await).await.unwrap();

    let manifest = manifest_of(&storage, &report.id);
    assert_eq!(manifest.len(), 4);
    assert!(!manifest.paths.contains_key("b.js"));
    assert!(manifest.paths.contains_key("img/d.svg"));
    assert_eq!(report.skipped, vec!["b.js".to_string()]);

    let text = File::new(tmp.path().join("log.txt")).read_string().await.unwrap();
    assert!(text.contains("b.js failed"));
}

#[tokio::test]
async fn test_missing_index_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = site(tmp.path(), &[("app.js", "console.log(1)")]).await;
    let storage = Arc::new(FakeStorage::default());
    let publisher = ArtifactPublisher::new(storage.clone(), PublishStrategy::PathManifest);

    let err = publisher
        .publish(&dir, &mut log(tmp.path()).await)
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::IndexMissing(_)));
    assert_eq!(storage.len(), 0);
}

#[tokio::test]
async fn test_manifest_upload_failure_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = site(tmp.path(), &[("index.html", "<html></html>")]).await;
    let storage = Arc::new(FakeStorage::failing_content_type(MANIFEST_CONTENT_TYPE));
    let publisher = ArtifactPublisher::new(storage, PublishStrategy::PathManifest);

    let err = publisher
        .publish(&dir, &mut log(tmp.path()).await)
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::ManifestUpload(_)));
}

#[tokio::test]
async fn test_bundle_strategy_uploads_once() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = site(
        tmp.path(),
        &[("index.html", "<html></html>"), ("app.js", "1")],
    )
    .await;
    let storage = Arc::new(FakeStorage::default());
    let publisher = ArtifactPublisher::new(storage.clone(), PublishStrategy::Bundle);

    let report = publisher.publish(&dir, &mut log(tmp.path()).await).await.unwrap();

    assert_eq!(report.strategy, PublishStrategy::Bundle);
    assert_eq!(storage.len(), 1);
    let (body, _) = storage.object(&report.id).unwrap();
    let bundle: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(bundle["index"], "index.html");
    assert_eq!(bundle["files"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_publish_to_local_storage() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = site(tmp.path(), &[("index.html", "<html></html>")]).await;
    let storage = Arc::new(LocalStorage::new(Dir::new(tmp.path().join("objects"))));
    let publisher = ArtifactPublisher::new(storage.clone(), PublishStrategy::PathManifest);

    let report = publisher.publish(&dir, &mut log(tmp.path()).await).await.unwrap();

    let manifest: PathManifest =
        serde_json::from_slice(&storage.read(&report.id).await.unwrap()).unwrap();
    let index_id = &manifest.paths["index.html"].id;
    assert_eq!(storage.read(index_id).await.unwrap(), b"<html></html>");
    assert_eq!(
        storage.tags(&report.id).await.unwrap(),
        vec![Tag::content_type(MANIFEST_CONTENT_TYPE)]
    );
}
