//! Artifact publisher
//!
//! Uploads a build output directory to content-addressed storage and
//! returns the id under which the whole site resolves.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::deploy::executor::ENTRY_POINT;
use crate::deploy::log::BuildLog;
use crate::errors::PublishError;
use crate::filesys::dir::{Dir, DirEntry};
use crate::publish::client::{Bundle, BundleFile, StorageClient, Tag};
use crate::publish::manifest::{rewrite_root_paths, PathManifest, MANIFEST_CONTENT_TYPE};
use crate::publish::mime::content_type_for;

/// How a directory is turned into a deployment id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStrategy {
    /// One upload per file plus a path manifest; the manifest id is returned
    #[default]
    PathManifest,

    /// The whole directory as a single bundled upload
    Bundle,
}

/// What a publish produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Deployment id (manifest or bundle id)
    pub id: String,

    pub strategy: PublishStrategy,

    /// Total bytes of the enumerated files
    pub total_bytes: u64,

    /// Quoted deposit cost, if the price query succeeded
    pub cost: Option<u64>,

    /// Relative path → content id of every uploaded file (path manifest only)
    pub files: BTreeMap<String, String>,

    /// Relative paths whose upload failed and were left out
    pub skipped: Vec<String>,
}

/// Publishes build outputs through a [`StorageClient`]
pub struct ArtifactPublisher {
    client: Arc<dyn StorageClient>,
    strategy: PublishStrategy,
}

impl ArtifactPublisher {
    pub fn new(client: Arc<dyn StorageClient>, strategy: PublishStrategy) -> Self {
        Self { client, strategy }
    }

    pub fn strategy(&self) -> PublishStrategy {
        self.strategy
    }

    /// Publish `dir` and delete it afterwards.
    ///
    /// A missing entry point and a failed manifest (or bundle) upload are
    /// fatal. Individual file uploads that fail are logged and skipped.
    pub async fn publish(
        &self,
        dir: &Dir,
        log: &mut BuildLog,
    ) -> Result<PublishReport, PublishError> {
        info!("Publishing {}", dir.path().display());
        prepare_entry_point(dir).await?;

        let files = dir
            .walk_files()
            .await
            .map_err(|e| PublishError::Storage(format!("Unable to list build output: {}", e)))?;
        let total_bytes: u64 = files.iter().map(|f| f.size).sum();
        let cost = self.quote(files.len(), total_bytes, log).await;

        let mut report = match self.strategy {
            PublishStrategy::PathManifest => self.publish_manifest(&files, log).await?,
            PublishStrategy::Bundle => self.publish_bundle(&files).await?,
        };
        report.total_bytes = total_bytes;
        report.cost = cost;

        log_line(log, &format!("==> Published {}", report.id)).await;
        info!("Published {} as {}", dir.path().display(), report.id);

        if let Err(e) = dir.delete().await {
            warn!("Failed to delete {}: {}", dir.path().display(), e);
        }
        Ok(report)
    }

    async fn quote(&self, count: usize, total_bytes: u64, log: &mut BuildLog) -> Option<u64> {
        match self.client.price(total_bytes).await {
            Ok(cost) => {
                info!("Deploying {} files ({} bytes) costs {}", count, total_bytes, cost);
                log_line(
                    log,
                    &format!("==> {} files, {} bytes, deposit cost {}", count, total_bytes, cost),
                )
                .await;
                Some(cost)
            }
            Err(e) => {
                warn!("Price query for {} bytes failed: {}", total_bytes, e);
                None
            }
        }
    }

    async fn publish_manifest(
        &self,
        files: &[DirEntry],
        log: &mut BuildLog,
    ) -> Result<PublishReport, PublishError> {
        let mut uploaded = BTreeMap::new();
        let mut skipped = Vec::new();

        for file in files {
            match self.upload_file(file).await {
                Ok(id) => {
                    log_line(log, &format!("    {} -> {}", file.relative, id)).await;
                    uploaded.insert(file.relative.clone(), id);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", file.relative, e);
                    log_line(log, &format!("    {} failed: {}", file.relative, e)).await;
                    skipped.push(file.relative.clone());
                }
            }
        }

        let manifest = PathManifest::new(ENTRY_POINT, uploaded.clone());
        let body = serde_json::to_vec(&manifest)
            .map_err(|e| PublishError::ManifestUpload(e.to_string()))?;
        let id = self
            .client
            .upload(body, &[Tag::content_type(MANIFEST_CONTENT_TYPE)])
            .await
            .map_err(|e| PublishError::ManifestUpload(e.to_string()))?;

        Ok(PublishReport {
            id,
            strategy: PublishStrategy::PathManifest,
            total_bytes: 0,
            cost: None,
            files: uploaded,
            skipped,
        })
    }

    async fn upload_file(&self, file: &DirEntry) -> Result<String, PublishError> {
        let data = tokio::fs::read(&file.path).await?;
        let tags = [Tag::content_type(content_type_for(&file.relative))];
        self.client.upload(data, &tags).await
    }

    async fn publish_bundle(&self, files: &[DirEntry]) -> Result<PublishReport, PublishError> {
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let data = tokio::fs::read(&file.path).await?;
            entries.push(BundleFile {
                path: file.relative.clone(),
                content_type: content_type_for(&file.relative).to_string(),
                data: STANDARD.encode(data),
            });
        }

        let bundle = Bundle {
            index: ENTRY_POINT.to_string(),
            files: entries,
        };
        let id = self.client.upload_bundle(&bundle).await?;

        Ok(PublishReport {
            id,
            strategy: PublishStrategy::Bundle,
            total_bytes: 0,
            cost: None,
            files: BTreeMap::new(),
            skipped: Vec::new(),
        })
    }
}

/// Check the entry point exists and make its root-absolute links relative
async fn prepare_entry_point(dir: &Dir) -> Result<(), PublishError> {
    let index = dir.file(ENTRY_POINT);
    if !index.exists().await {
        return Err(PublishError::IndexMissing(dir.path().display().to_string()));
    }

    let html = tokio::fs::read(index.path()).await?;
    let rewritten = rewrite_root_paths(&html);
    if rewritten != html {
        tokio::fs::write(index.path(), rewritten).await?;
    }
    Ok(())
}

async fn log_line(log: &mut BuildLog, message: &str) {
    if let Err(e) = log.line(message).await {
        warn!("Failed to write build log: {}", e);
    }
}
