//! Composition of the in-sandbox build steps

use crate::deploy::sandbox::{ExecStep, StepKind};
use crate::errors::DeployError;
use crate::models::deployment::DeploymentRequest;

/// Home directory of the base image's unprivileged user
pub const SANDBOX_HOME: &str = "/home/node";

/// Where the host project directory is mounted
pub const OUTPUT_MOUNT: &str = "/home/node/out";

/// Ordered steps for one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub steps: Vec<ExecStep>,
}

impl BuildPlan {
    /// Build the step list for a validated request.
    ///
    /// Repository, branch and output directory become discrete arguments.
    /// The install and build commands are the caller's own shell snippets and
    /// are each passed to `sh -c` as a single argument.
    pub fn compose(request: &DeploymentRequest) -> Result<Self, DeployError> {
        request.validate()?;

        let folder = request.folder_name();
        let url = request.clone_url()?;
        let branch = request.branch.trim().to_string();
        let output = request.output_subdir();
        let project = format!("{}/{}", SANDBOX_HOME, folder);
        let target = format!("{}/{}", OUTPUT_MOUNT, output);

        let mut steps = Vec::with_capacity(7);

        if let Some(manager) = package_manager(&request.install_command) {
            steps.push(step(
                StepKind::PackageManager,
                &["npm", "install", "-g", manager],
                SANDBOX_HOME,
            ));
        }

        steps.push(step(StepKind::Clean, &["rm", "-rf", "--", &project], SANDBOX_HOME));
        steps.push(step(
            StepKind::Clone,
            &["git", "clone", "--depth", "1", "--branch", &branch, "--", &url, &folder],
            SANDBOX_HOME,
        ));
        steps.push(step(
            StepKind::Install,
            &["sh", "-c", request.install_command.trim()],
            &project,
        ));
        steps.push(step(
            StepKind::Build,
            &["sh", "-c", request.build_command.trim()],
            &project,
        ));
        steps.push(step(StepKind::PrepareOutput, &["mkdir", "-p", "--", &target], SANDBOX_HOME));
        steps.push(step(
            StepKind::CopyOutput,
            &["cp", "-r", "--", &format!("{}/{}/.", project, output), &target],
            SANDBOX_HOME,
        ));

        Ok(Self { steps })
    }
}

/// Alternate package manager named by the install command, if any
pub fn package_manager(install_command: &str) -> Option<&'static str> {
    let command = install_command.trim_start();
    if command.starts_with("pnpm") {
        Some("pnpm")
    } else if command.starts_with("yarn") {
        Some("yarn")
    } else {
        None
    }
}

fn step(kind: StepKind, argv: &[&str], workdir: &str) -> ExecStep {
    ExecStep {
        kind,
        argv: argv.iter().map(|s| s.to_string()).collect(),
        workdir: workdir.to_string(),
    }
}
