//! External tool wrapper
//!
//! Wraps the provisioning CLI (kubectl by default) behind the [`Provisioner`]
//! trait. The daemon never interprets tool output beyond the exit status;
//! manifests carry all the intent.

use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Default deadline for first-time provisioning
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Default deadline for re-applying changed manifests
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Default deadline for teardown
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Client applying or deleting a directory of manifests
///
/// Both operations take the per-action deadline from the caller, since the
/// same `apply` serves creation and update with different deadlines.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Apply every manifest under `dir`
    async fn apply(&self, dir: &Path, deadline: Duration) -> Result<String>;

    /// Delete every object described by the manifests under `dir`
    async fn delete(&self, dir: &Path, deadline: Duration) -> Result<String>;
}

/// One external command; `{dir}` in args is replaced by the manifest directory
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn rendered_args(&self, dir: &Path) -> Vec<String> {
        let dir = dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{dir}", &dir))
            .collect()
    }
}

/// Provisioner driving an external CLI
#[derive(Debug, Clone)]
pub struct CliProvisioner {
    apply_command: CommandSpec,
    delete_command: CommandSpec,
}

impl CliProvisioner {
    pub fn new(apply_command: CommandSpec, delete_command: CommandSpec) -> Self {
        Self {
            apply_command,
            delete_command,
        }
    }

    /// kubectl apply / kubectl delete against the manifest directory
    pub fn kubectl() -> Self {
        Self::new(
            CommandSpec::new("kubectl", &["apply", "-f", "{dir}"]),
            CommandSpec::new("kubectl", &["delete", "-f", "{dir}", "--ignore-not-found"]),
        )
    }

    /// Run one command with a hard deadline and return stdout
    async fn run(&self, spec: &CommandSpec, dir: &Path, deadline: Duration) -> Result<String> {
        let args = spec.rendered_args(dir);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Dropping the future on timeout must not leave the child running
        cmd.kill_on_drop(true);

        tracing::debug!("Running: {} {}", spec.program, args.join(" "));

        let output = tokio::time::timeout(deadline, cmd.output())
            .await
            .map_err(|_| ProvisionError::Timeout {
                program: spec.program.clone(),
                after: deadline,
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::CommandFailed {
                program: spec.program.clone(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for CliProvisioner {
    fn default() -> Self {
        Self::kubectl()
    }
}

#[async_trait]
impl Provisioner for CliProvisioner {
    async fn apply(&self, dir: &Path, deadline: Duration) -> Result<String> {
        self.run(&self.apply_command, dir, deadline).await
    }

    async fn delete(&self, dir: &Path, deadline: Duration) -> Result<String> {
        self.run(&self.delete_command, dir, deadline).await
    }
}
