//! Docker-backed build sandboxes, driven through the `docker` CLI

use std::process::{Output, Stdio};

use async_trait::async_trait;
use futures::future::join;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::deploy::log::BuildLog;
use crate::deploy::plan::SANDBOX_HOME;
use crate::deploy::sandbox::{ExecStep, SandboxId, SandboxRuntime, SandboxSpec};
use crate::errors::DeployError;

/// Label attached to every sandbox so leftovers can be found with `docker ps`
pub const SANDBOX_LABEL: &str = "permadeploy.sandbox=1";

/// Sandbox runtime shelling out to the docker CLI
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: String,
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Use a different CLI binary, e.g. `podman`
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn docker(&self, args: &[String]) -> Result<Output, std::io::Error> {
        debug!("{} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
    }

    /// Run a docker command that must succeed, mapping failures with `wrap`
    async fn docker_ok(
        &self,
        args: Vec<String>,
        wrap: fn(String) -> DeployError,
    ) -> Result<Output, DeployError> {
        let output = self
            .docker(&args)
            .await
            .map_err(|e| wrap(format!("Failed to run {} {}: {}", self.binary, args[0], e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(wrap(format!(
                "{} {} failed: {}",
                self.binary,
                args[0],
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for `docker create`. The container idles on an interactive
/// shell so that steps can be exec'd into it one by one.
pub fn create_args(spec: &SandboxSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--interactive".to_string(),
        "--tty".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--label".to_string(),
        SANDBOX_LABEL.to_string(),
        "--workdir".to_string(),
        SANDBOX_HOME.to_string(),
    ];
    for mount in &spec.mounts {
        args.push("--volume".to_string());
        args.push(format!("{}:{}:rw", mount.host.display(), mount.target));
    }
    args.push(spec.image.clone());
    args.push("sh".to_string());
    args
}

/// Arguments for `docker exec`. No tty, so stdout and stderr stay separate
/// pipes on our side.
pub fn exec_args(id: &SandboxId, step: &ExecStep) -> Vec<String> {
    let mut args = vec![
        "exec".to_string(),
        "--workdir".to_string(),
        step.workdir.clone(),
        id.0.clone(),
    ];
    args.extend(step.argv.iter().cloned());
    args
}

async fn pump<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if tx.send(buf[..n].to_vec()).await.is_err() {
            return Ok(());
        }
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    async fn ensure_image(&self, image: &str) -> Result<(), DeployError> {
        let inspect = self
            .docker(&["image".to_string(), "inspect".to_string(), image.to_string()])
            .await
            .map_err(|e| DeployError::Provisioning(format!("Failed to run {}: {}", self.binary, e)))?;
        if inspect.status.success() {
            debug!("Image {} already present", image);
            return Ok(());
        }

        info!("Pulling image {}", image);
        self.docker_ok(vec!["pull".to_string(), image.to_string()], DeployError::Provisioning)
            .await?;
        info!("Pulled image {}", image);
        Ok(())
    }

    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxId, DeployError> {
        let output = self.docker_ok(create_args(spec), DeployError::Provisioning).await?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(DeployError::Provisioning(format!(
                "{} create returned no container id",
                self.binary
            )));
        }
        info!("Created sandbox {} ({})", spec.name, &id[..id.len().min(12)]);
        Ok(SandboxId(id))
    }

    async fn start(&self, id: &SandboxId) -> Result<(), DeployError> {
        self.docker_ok(vec!["start".to_string(), id.0.clone()], DeployError::Provisioning)
            .await?;
        Ok(())
    }

    async fn exec(
        &self,
        id: &SandboxId,
        step: &ExecStep,
        log: &mut BuildLog,
    ) -> Result<i32, DeployError> {
        let args = exec_args(id, step);
        debug!("{} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeployError::Internal("exec stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DeployError::Internal("exec stderr not captured".to_string()))?;

        let (tx, mut rx) = mpsc::channel(64);
        let out_task = tokio::spawn(pump(stdout, tx.clone()));
        let err_task = tokio::spawn(pump(stderr, tx));

        while let Some(chunk) = rx.recv().await {
            log.write(&chunk).await?;
        }

        let (out, err) = join(out_task, err_task).await;
        for joined in [out, err] {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Reading build output failed: {}", e),
                Err(e) => warn!("Build output reader panicked: {}", e),
            }
        }

        let status = child.wait().await?;
        // Killed by a signal: report it as a failure all the same.
        Ok(status.code().unwrap_or(-1))
    }

    async fn snapshot(&self, id: &SandboxId) -> Result<(), DeployError> {
        self.docker_ok(vec!["commit".to_string(), id.0.clone()], DeployError::Internal)
            .await?;
        Ok(())
    }

    async fn stop(&self, id: &SandboxId) -> Result<(), DeployError> {
        self.docker_ok(
            vec!["stop".to_string(), "--time".to_string(), "5".to_string(), id.0.clone()],
            DeployError::Internal,
        )
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &SandboxId) -> Result<(), DeployError> {
        self.docker_ok(
            vec!["rm".to_string(), "--force".to_string(), id.0.clone()],
            DeployError::Internal,
        )
        .await?;
        Ok(())
    }

    async fn prune_images(&self) -> Result<(), DeployError> {
        self.docker_ok(
            vec!["image".to_string(), "prune".to_string(), "--force".to_string()],
            DeployError::Internal,
        )
        .await?;
        Ok(())
    }
}
