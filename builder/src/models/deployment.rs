//! Deployment models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::errors::DeployError;

/// Correlation id handed out by `submit` and stored with every queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(Uuid);

impl DeploymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeploymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for DeploymentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A request to build a repository and publish its output
///
/// Missing fields deserialize to empty strings so that `validate` can report
/// them by name instead of failing with a serde error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentRequest {
    /// Repository clone URL, or `owner/repo` shorthand for GitHub
    pub repository: String,

    /// Branch to clone
    pub branch: String,

    /// Shell command installing dependencies, e.g. `npm install`
    pub install_command: String,

    /// Shell command producing the static site, e.g. `npm run build`
    pub build_command: String,

    /// Output directory relative to the repository root, e.g. `dist`
    pub output_dir: String,
}

impl DeploymentRequest {
    /// Check required fields, then the fields that end up as command arguments.
    pub fn validate(&self) -> Result<(), DeployError> {
        let required = [
            (&self.repository, "Repository"),
            (&self.install_command, "Install Command"),
            (&self.build_command, "Build Command"),
            (&self.output_dir, "Output Directory"),
            (&self.branch, "Branch"),
        ];
        for (value, name) in required {
            if value.trim().is_empty() {
                return Err(DeployError::Validation(format!("{} is required", name)));
            }
        }

        self.clone_url()?;
        validate_branch(self.branch.trim())?;
        validate_output_dir(self.output_dir.trim())?;

        let folder = self.folder_name();
        if !is_safe_segment(&folder) {
            return Err(DeployError::Validation(format!(
                "Repository name '{}' cannot be used as a project folder",
                folder
            )));
        }

        for (value, name) in [
            (&self.install_command, "Install Command"),
            (&self.build_command, "Build Command"),
        ] {
            if value.contains('\0') {
                return Err(DeployError::Validation(format!("{} contains a NUL byte", name)));
            }
        }

        Ok(())
    }

    /// Project folder name derived from the repository URL
    pub fn folder_name(&self) -> String {
        folder_name(&self.repository)
    }

    /// Output directory without leading `./` or trailing slashes
    pub fn output_subdir(&self) -> String {
        self.output_dir
            .trim()
            .trim_start_matches("./")
            .trim_end_matches('/')
            .to_string()
    }

    /// Normalized clone URL. `owner/repo` shorthand resolves to GitHub.
    pub fn clone_url(&self) -> Result<String, DeployError> {
        let repository = self.repository.trim();
        if repository.starts_with('-') {
            return Err(DeployError::Validation(format!(
                "Invalid repository: {}",
                repository
            )));
        }

        match Url::parse(repository) {
            Ok(url) => match url.scheme() {
                "https" | "http" | "ssh" | "git" => Ok(url.to_string()),
                scheme => Err(DeployError::Validation(format!(
                    "Unsupported repository scheme: {}",
                    scheme
                ))),
            },
            Err(_) => {
                let segments: Vec<&str> = repository.trim_end_matches('/').split('/').collect();
                if segments.len() == 2 && segments.iter().all(|s| is_safe_segment(s)) {
                    Ok(format!("https://github.com/{}", segments.join("/")))
                } else {
                    Err(DeployError::Validation(format!(
                        "Invalid repository: {}",
                        repository
                    )))
                }
            }
        }
    }
}

/// Derive the project folder from a repository URL.
///
/// A trailing slash and a `.git` suffix are stripped and the last path segment
/// is taken, so `https://host/owner/repo.git` and `https://host/owner/repo`
/// both map to `repo`.
pub fn folder_name(repository: &str) -> String {
    let trimmed = repository.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    trimmed
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn validate_branch(branch: &str) -> Result<(), DeployError> {
    let valid = !branch.starts_with('-')
        && !branch.starts_with('/')
        && !branch.ends_with('/')
        && !branch.ends_with(".lock")
        && !branch.contains("..")
        && !branch.contains("//")
        && branch
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if valid {
        Ok(())
    } else {
        Err(DeployError::Validation(format!("Invalid branch name: {}", branch)))
    }
}

fn validate_output_dir(output_dir: &str) -> Result<(), DeployError> {
    let trimmed = output_dir.trim_start_matches("./").trim_end_matches('/');
    let valid = !trimmed.is_empty()
        && !trimmed.starts_with('/')
        && trimmed.split('/').all(|segment| segment == "." || is_safe_segment(segment));
    if valid {
        Ok(())
    } else {
        Err(DeployError::Validation(format!(
            "Invalid output directory: {}",
            output_dir
        )))
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != ".."
        && !segment.starts_with('-')
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// The only thing persisted in the durable queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedDeployment {
    pub id: DeploymentId,
    pub request: DeploymentRequest,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedDeployment {
    pub fn new(id: DeploymentId, request: DeploymentRequest) -> Self {
        Self {
            id,
            request,
            enqueued_at: Utc::now(),
        }
    }
}

/// Terminal result relayed back to whoever submitted the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum DeploymentOutcome {
    /// Published; `id` is the manifest (or bundle) id
    Published { id: String },

    /// Failed with a human-readable message
    Failed { message: String },
}
