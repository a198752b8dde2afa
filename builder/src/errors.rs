//! Error types for the deployment pipeline

use thiserror::Error;

/// Main error type for a deployment
///
/// Everything except per-file upload failures is terminal for the request
/// that raised it; the message is relayed to the caller as-is.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// A required field is missing or malformed. Raised before admission.
    #[error("{0}")]
    Validation(String),

    /// Pulling the base image, creating or starting the sandbox failed
    #[error("Sandbox provisioning failed: {0}")]
    Provisioning(String),

    /// A composed build step exited with a non-zero status
    #[error("Build step '{step}' failed with exit code {code}")]
    StepFailed { step: String, code: i32 },

    /// The build ran but did not produce the expected entry point
    #[error("{0} does not exist in build")]
    ArtifactMissing(String),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while publishing a build output
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("index.html not found in {0}")]
    IndexMissing(String),

    #[error("Manifest upload failed: {0}")]
    ManifestUpload(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        PublishError::Storage(err.to_string())
    }
}
