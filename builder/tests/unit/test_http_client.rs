//! HTTP storage client tests against an in-process upload node

use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

use permadeploy::errors::PublishError;
use permadeploy::http::client::HttpStorageClient;
use permadeploy::publish::client::{Bundle, BundleFile, StorageClient, Tag};

#[derive(Default)]
struct Node {
    requests: Mutex<Vec<(String, HeaderMap, Bytes)>>,
}

async fn price(Path(bytes): Path<u64>) -> String {
    (bytes * 3).to_string()
}

async fn tx(State(node): State<Arc<Node>>, headers: HeaderMap, body: Bytes) -> (StatusCode, Json<Value>) {
    if body.as_ref() == b"too large" {
        return (StatusCode::PAYLOAD_TOO_LARGE, Json(json!({ "error": "too large" })));
    }
    node.requests.lock().unwrap().push(("tx".to_string(), headers, body));
    (StatusCode::OK, Json(json!({ "id": "tx-id" })))
}

async fn bundle(State(node): State<Arc<Node>>, headers: HeaderMap, body: Bytes) -> Json<Value> {
    node.requests.lock().unwrap().push(("bundle".to_string(), headers, body));
    Json(json!({ "id": "bundle-id" }))
}

async fn start_node() -> (String, Arc<Node>) {
    let node = Arc::new(Node::default());
    let app = Router::new()
        .route("/price/{bytes}", get(price))
        .route("/tx", post(tx))
        .route("/bundle", post(bundle))
        .with_state(node.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/", addr), node)
}

#[tokio::test]
async fn test_price_is_parsed() {
    let (url, _node) = start_node().await;
    let client = HttpStorageClient::new(&url, None).unwrap();

    assert!(!client.base_url().ends_with('/'));
    assert_eq!(client.price(1000).await.unwrap(), 3000);
}

#[tokio::test]
async fn test_upload_sends_tags_and_token() {
    let (url, node) = start_node().await;
    let client =
        HttpStorageClient::new(&url, Some(SecretString::from("secret-token".to_string()))).unwrap();

    let id = client
        .upload(
            b"<html></html>".to_vec(),
            &[Tag::content_type("text/html"), Tag::new("App-Name", "permadeploy")],
        )
        .await
        .unwrap();
    assert_eq!(id, "tx-id");

    let requests = node.requests.lock().unwrap();
    let (kind, headers, body) = &requests[0];
    assert_eq!(kind, "tx");
    assert_eq!(body.as_ref(), b"<html></html>");
    assert_eq!(headers["content-type"], "text/html");
    assert_eq!(headers["x-tag-app-name"], "permadeploy");
    assert_eq!(headers["authorization"], "Bearer secret-token");
}

#[tokio::test]
async fn test_rejected_upload_is_a_storage_error() {
    let (url, _node) = start_node().await;
    let client = HttpStorageClient::new(&url, None).unwrap();

    let err = client.upload(b"too large".to_vec(), &[]).await.unwrap_err();
    match err {
        PublishError::Storage(message) => assert!(message.contains("413")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_bundle_is_posted_as_json() {
    let (url, node) = start_node().await;
    let client = HttpStorageClient::new(&url, None).unwrap();

    let bundle = Bundle {
        index: "index.html".to_string(),
        files: vec![BundleFile {
            path: "index.html".to_string(),
            content_type: "text/html".to_string(),
            data: "PGh0bWw+".to_string(),
        }],
    };
    assert_eq!(client.upload_bundle(&bundle).await.unwrap(), "bundle-id");

    let requests = node.requests.lock().unwrap();
    let (kind, headers, body) = &requests[0];
    assert_eq!(kind, "bundle");
    assert!(headers.get("authorization").is_none());
    let sent: Bundle = serde_json::from_slice(body).unwrap();
    assert_eq!(sent, bundle);
}

#[tokio::test]
async fn test_unreachable_node_fails() {
    let client = assert_ok!(HttpStorageClient::new("http://127.0.0.1:9", None));
    assert_err!(client.price(1).await);
}
