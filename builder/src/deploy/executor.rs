//! Build executor
//!
//! Runs one deployment request inside a disposable sandbox and leaves the
//! verified output directory on the host.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::deploy::log::BuildLog;
use crate::deploy::plan::{BuildPlan, OUTPUT_MOUNT};
use crate::deploy::sandbox::{Mount, SandboxId, SandboxRuntime, SandboxSpec};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::deployment::{DeploymentId, DeploymentRequest};
use crate::storage::layout::StorageLayout;

/// Entry point every published site must contain
pub const ENTRY_POINT: &str = "index.html";

/// Executor options
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Base runtime image for sandboxes
    pub base_image: String,

    /// Mirror build output to stdout as well as the project log
    pub mirror_stdout: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            base_image: "node".to_string(),
            mirror_stdout: true,
        }
    }
}

/// A successful build, ready to publish
pub struct BuildOutput {
    /// Project folder name
    pub folder: String,

    /// Host directory holding the copied output
    pub dir: Dir,

    /// The project's log, still open for the publish stage
    pub log: BuildLog,
}

/// Runs deployment requests in sandboxes
pub struct BuildExecutor {
    runtime: Arc<dyn SandboxRuntime>,
    layout: StorageLayout,
    options: ExecutorOptions,
}

impl BuildExecutor {
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        layout: StorageLayout,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            runtime,
            layout,
            options,
        }
    }

    /// Build `request` to completion.
    ///
    /// The sandbox is stopped and removed on every path once it has been
    /// created. Dangling layers are pruned on every path past validation.
    pub async fn run(
        &self,
        id: DeploymentId,
        request: &DeploymentRequest,
    ) -> Result<BuildOutput, DeployError> {
        let plan = BuildPlan::compose(request)?;
        let folder = request.folder_name();

        let project_dir = self.layout.project_dir(&folder);
        project_dir.recreate().await?;
        let mut log = BuildLog::create(&self.layout.log_file(&folder), self.options.mirror_stdout)
            .await?;

        info!("Building deployment {} ({}, branch {})", id, request.repository, request.branch);
        log.line(&format!(
            "==> Deployment {}: {} (branch {})",
            id, request.repository, request.branch
        ))
        .await?;

        let sandbox = match self.provision(id, &folder, &project_dir).await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                error!("Provisioning failed for {}: {}", folder, e);
                let _ = log.line(&format!("==> {}", e)).await;
                self.prune_dangling().await;
                return Err(e);
            }
        };

        let result = self.build(&sandbox, &plan, request, &project_dir, &mut log).await;
        self.teardown(&sandbox).await;

        match result {
            Ok(dir) => {
                info!("Build for {} finished, output at {}", folder, dir.path().display());
                Ok(BuildOutput { folder, dir, log })
            }
            Err(e) => {
                error!("Build for {} failed: {}", folder, e);
                let _ = log.line(&format!("==> {}", e)).await;
                Err(e)
            }
        }
    }

    async fn provision(
        &self,
        id: DeploymentId,
        folder: &str,
        project_dir: &Dir,
    ) -> Result<SandboxId, DeployError> {
        self.runtime.ensure_image(&self.options.base_image).await?;

        let host = tokio::fs::canonicalize(project_dir.path()).await.map_err(|e| {
            DeployError::Provisioning(format!(
                "Unable to resolve {}: {}",
                project_dir.path().display(),
                e
            ))
        })?;
        let short_id: String = id.to_string().chars().take(8).collect();
        let spec = SandboxSpec {
            name: format!("permadeploy-{}-{}", folder.to_lowercase(), short_id),
            image: self.options.base_image.clone(),
            mounts: vec![Mount {
                host,
                target: OUTPUT_MOUNT.to_string(),
            }],
        };

        let sandbox = self.runtime.create(&spec).await?;
        if let Err(e) = self.runtime.start(&sandbox).await {
            if let Err(remove_err) = self.runtime.remove(&sandbox).await {
                warn!("Failed to remove sandbox {} after start failure: {}", sandbox, remove_err);
            }
            return Err(e);
        }
        Ok(sandbox)
    }

    async fn build(
        &self,
        sandbox: &SandboxId,
        plan: &BuildPlan,
        request: &DeploymentRequest,
        project_dir: &Dir,
        log: &mut BuildLog,
    ) -> Result<Dir, DeployError> {
        for step in &plan.steps {
            log.line(&format!("==> {}: {}", step.kind, step.argv.join(" "))).await?;
            let code = self.runtime.exec(sandbox, step, log).await?;
            if code != 0 {
                return Err(DeployError::StepFailed {
                    step: step.kind.to_string(),
                    code,
                });
            }
        }

        if let Err(e) = self.runtime.snapshot(sandbox).await {
            warn!("Failed to snapshot sandbox {}: {}", sandbox, e);
        }

        let output = project_dir.subdir(&request.output_subdir());
        if !output.file(ENTRY_POINT).exists().await {
            return Err(DeployError::ArtifactMissing(ENTRY_POINT.to_string()));
        }
        Ok(output)
    }

    async fn teardown(&self, sandbox: &SandboxId) {
        if let Err(e) = self.runtime.stop(sandbox).await {
            warn!("Failed to stop sandbox {}: {}", sandbox, e);
        }
        if let Err(e) = self.runtime.remove(sandbox).await {
            warn!("Failed to remove sandbox {}: {}", sandbox, e);
        }
        self.prune_dangling().await;
        debug!("Sandbox {} torn down", sandbox);
    }

    async fn prune_dangling(&self) {
        if let Err(e) = self.runtime.prune_images().await {
            warn!("Failed to prune dangling images: {}", e);
        }
    }
}
