//! Content-addressed storage client abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::PublishError;

/// Name/value tag stored alongside an uploaded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn content_type(value: impl Into<String>) -> Self {
        Self::new("Content-Type", value)
    }
}

/// One file inside a bundle upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFile {
    pub path: String,
    pub content_type: String,
    /// Standard base64 of the file bytes
    pub data: String,
}

/// A whole directory uploaded as one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Path of the entry point inside `files`
    pub index: String,
    pub files: Vec<BundleFile>,
}

/// Storage network where every object gets an immutable id on upload
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Deposit cost, in the network's atomic unit, of storing `bytes` bytes
    async fn price(&self, bytes: u64) -> Result<u64, PublishError>;

    /// Upload one object and return its id
    async fn upload(&self, data: Vec<u8>, tags: &[Tag]) -> Result<String, PublishError>;

    /// Upload a directory as a single bundled object and return its id
    async fn upload_bundle(&self, bundle: &Bundle) -> Result<String, PublishError>;
}
