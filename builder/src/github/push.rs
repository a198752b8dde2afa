//! Push events forwarded by the GitHub App
//!
//! Only the fields needed to decide whether to deploy, and what, are
//! modelled. Webhook signature checks and installation tokens stay with
//! the App.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::deployment::DeploymentRequest;

/// Which pushes trigger a deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Pushes to any ref other than the default branch, tags included. The
    /// deployed branch is still the default branch.
    #[default]
    NonDefaultBranch,

    /// Pushes to the default branch only
    DefaultBranch,

    /// Every push to a branch
    AnyBranch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: Owner,
    pub default_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub id: u64,
}

/// The subset of a `push` webhook payload we read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: Repository,
    #[serde(default)]
    pub installation: Option<Installation>,
}

impl PushEvent {
    /// Branch name of the pushed ref, if it is a branch
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }

    pub fn is_default_branch(&self) -> bool {
        self.branch() == Some(self.repository.default_branch.as_str())
    }
}

/// Build settings a repository stores for itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoDeployConfig {
    pub install_command: String,
    pub build_command: String,
    pub output_dir: String,
}

/// Map a push to the deployment it should trigger, if any
pub fn request_for_push(
    event: &PushEvent,
    config: &RepoDeployConfig,
    policy: TriggerPolicy,
) -> Option<DeploymentRequest> {
    let repo = &event.repository;

    // Tag pushes fire the default policy too; the default branch is built.
    let branch = match (policy, event.branch()) {
        (TriggerPolicy::NonDefaultBranch, _) if !event.is_default_branch() => {
            repo.default_branch.clone()
        }
        (TriggerPolicy::DefaultBranch, _) if event.is_default_branch() => {
            repo.default_branch.clone()
        }
        (TriggerPolicy::AnyBranch, Some(pushed)) => pushed.to_string(),
        _ => {
            debug!("Push to {} does not match trigger policy {:?}", event.git_ref, policy);
            return None;
        }
    };

    Some(DeploymentRequest {
        repository: format!("{}/{}", repo.owner.login, repo.name),
        branch,
        install_command: config.install_command.clone(),
        build_command: config.build_command.clone(),
        output_dir: config.output_dir.clone(),
    })
}
