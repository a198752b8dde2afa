//! Sandbox runtime abstraction

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::deploy::log::BuildLog;
use crate::errors::DeployError;

/// Opaque handle to a created sandbox
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxId(pub String);

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Host directory bound read-write into the sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub target: String,
}

/// Everything needed to create a sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    /// Human-readable name, unique per deployment
    pub name: String,

    /// Base runtime image
    pub image: String,

    pub mounts: Vec<Mount>,
}

/// What a composed step does, used in logs and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    PackageManager,
    Clean,
    Clone,
    Install,
    Build,
    PrepareOutput,
    CopyOutput,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::PackageManager => "package manager",
            StepKind::Clean => "clean",
            StepKind::Clone => "clone",
            StepKind::Install => "install",
            StepKind::Build => "build",
            StepKind::PrepareOutput => "prepare output",
            StepKind::CopyOutput => "copy output",
        };
        f.write_str(name)
    }
}

/// One process run inside the sandbox. `argv[0]` is executed directly,
/// never through a shell built from request fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecStep {
    pub kind: StepKind,
    pub argv: Vec<String>,
    pub workdir: String,
}

/// Container-like runtime hosting build sandboxes
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Make `image` available locally, pulling it when absent
    async fn ensure_image(&self, image: &str) -> Result<(), DeployError>;

    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxId, DeployError>;

    async fn start(&self, id: &SandboxId) -> Result<(), DeployError>;

    /// Run a step, streaming its combined output into `log` as it arrives.
    /// Returns the step's exit code.
    async fn exec(
        &self,
        id: &SandboxId,
        step: &ExecStep,
        log: &mut BuildLog,
    ) -> Result<i32, DeployError>;

    /// Record the sandbox's final filesystem state
    async fn snapshot(&self, id: &SandboxId) -> Result<(), DeployError>;

    async fn stop(&self, id: &SandboxId) -> Result<(), DeployError>;

    async fn remove(&self, id: &SandboxId) -> Result<(), DeployError>;

    /// Reclaim dangling image layers left by pulls and snapshots
    async fn prune_images(&self) -> Result<(), DeployError>;
}
