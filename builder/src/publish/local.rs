//! Content-addressed storage on the local filesystem

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::PublishError;
use crate::filesys::dir::Dir;
use crate::publish::client::{Bundle, StorageClient, Tag};

/// Content type recorded for bundle uploads
pub const BUNDLE_CONTENT_TYPE: &str = "application/x.permadeploy-bundle+json";

/// Id of `data`: unpadded base64url of its SHA-256
pub fn content_id(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(data))
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    tags: Vec<Tag>,
    size: u64,
}

/// Stores each object as `<dir>/<id>` with its tags in `<dir>/<id>.json`.
///
/// Uploading identical bytes twice yields the same id. Storage is free, so
/// `price` reports zero.
pub struct LocalStorage {
    dir: Dir,
}

impl LocalStorage {
    pub fn new(dir: Dir) -> Self {
        Self { dir }
    }

    /// Bytes of a stored object
    pub async fn read(&self, id: &str) -> Result<Vec<u8>, PublishError> {
        Ok(tokio::fs::read(self.dir.path().join(id)).await?)
    }

    /// Tags of a stored object
    pub async fn tags(&self, id: &str) -> Result<Vec<Tag>, PublishError> {
        let meta = self
            .dir
            .file(&format!("{}.json", id))
            .read_json::<ObjectMeta>()
            .await
            .map_err(|e| PublishError::Storage(e.to_string()))?;
        Ok(meta.tags)
    }

    async fn store(&self, data: &[u8], tags: &[Tag]) -> Result<String, PublishError> {
        let id = content_id(data);
        let meta = ObjectMeta {
            tags: tags.to_vec(),
            size: data.len() as u64,
        };

        self.dir
            .file(&id)
            .write_atomic(data)
            .await
            .map_err(|e| PublishError::Storage(e.to_string()))?;
        self.dir
            .file(&format!("{}.json", id))
            .write_json(&meta)
            .await
            .map_err(|e| PublishError::Storage(e.to_string()))?;

        debug!("Stored {} bytes as {}", data.len(), id);
        Ok(id)
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn price(&self, _bytes: u64) -> Result<u64, PublishError> {
        Ok(0)
    }

    async fn upload(&self, data: Vec<u8>, tags: &[Tag]) -> Result<String, PublishError> {
        self.store(&data, tags).await
    }

    async fn upload_bundle(&self, bundle: &Bundle) -> Result<String, PublishError> {
        let data = serde_json::to_vec(bundle).map_err(|e| PublishError::Storage(e.to_string()))?;
        self.store(&data, &[Tag::content_type(BUNDLE_CONTENT_TYPE)]).await
    }
}
