//! Container runtime boundary
//!
//! Execution units are long-lived containers reached through the runtime
//! CLI (`docker` or `podman`). Everything the engine does to a unit goes
//! through the [`UnitRuntime`] trait:
//! - Probing whether a unit exists and is running
//! - Starting a stopped unit or creating a new idle one
//! - Copying files in and out of the unit
//! - Executing commands inside the unit

use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Live state of an execution unit as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Running,
    Stopped,
    Absent,
}

/// Combined output of a command executed inside a unit
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    /// stdout followed by stderr
    pub output: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors raised by the runtime CLI
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to execute '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },
}

/// Primitive operations against named execution units
#[async_trait]
pub trait UnitRuntime: Send + Sync {
    /// Reports whether the unit is running, stopped or missing
    async fn probe(&self, unit: &str) -> Result<UnitState, RuntimeError>;

    /// Starts an existing, stopped unit
    async fn start(&self, unit: &str) -> Result<(), RuntimeError>;

    /// Creates a new idle-looping unit from an image
    async fn create(&self, unit: &str, image: &str) -> Result<(), RuntimeError>;

    /// Copies a local file to a path inside the unit
    async fn copy_in(&self, unit: &str, local: &Path, remote: &str) -> Result<(), RuntimeError>;

    /// Runs a command inside the unit and captures its output
    ///
    /// A non-zero exit code is not an error at this level.
    async fn exec(&self, unit: &str, argv: &[String]) -> Result<ExecOutput, RuntimeError>;

    /// Copies a path inside the unit to a local file
    async fn copy_out(&self, unit: &str, remote: &str, local: &Path) -> Result<(), RuntimeError>;
}

/// Checks that the runtime CLI is installed and answering
pub async fn check_runtime_available(binary: &str) -> anyhow::Result<String> {
    use anyhow::Context;

    let output = Command::new(binary)
        .arg("--version")
        .output()
        .await
        .with_context(|| format!("Failed to execute '{} --version'. Is it installed?", binary))?;

    if !output.status.success() {
        anyhow::bail!("{} is not working correctly", binary);
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    info!("Container runtime is available: {}", version);

    Ok(version)
}

/// [`UnitRuntime`] backed by the docker/podman command line
#[derive(Debug, Clone)]
pub struct CliRuntime {
    binary: String,
}

impl CliRuntime {
    /// Creates a runtime that shells out to `binary` (e.g. "docker" or "podman")
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Runs the runtime CLI with `args`, logging its output
    ///
    /// Child processes are killed if the returned future is dropped.
    async fn invoke(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        debug!("Running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stdout.trim().is_empty() {
            debug!("{} {} stdout: {}", self.binary, args[0], stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("{} {} stderr: {}", self.binary, args[0], stderr.trim());
        }

        Ok(output)
    }

    /// Like [`invoke`](Self::invoke) but treats a non-zero exit as an error
    async fn invoke_checked(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        let output = self.invoke(args).await?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: format!("{} {}", self.binary, args.first().copied().unwrap_or_default()),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl UnitRuntime for CliRuntime {
    async fn probe(&self, unit: &str) -> Result<UnitState, RuntimeError> {
        let output = self
            .invoke(&["inspect", "--format", "{{.State.Running}}", unit])
            .await?;

        if !output.status.success() {
            // inspect fails for unknown names
            return Ok(UnitState::Absent);
        }

        let running = String::from_utf8_lossy(&output.stdout).trim() == "true";
        Ok(if running {
            UnitState::Running
        } else {
            UnitState::Stopped
        })
    }

    async fn start(&self, unit: &str) -> Result<(), RuntimeError> {
        self.invoke_checked(&["start", unit]).await?;
        Ok(())
    }

    async fn create(&self, unit: &str, image: &str) -> Result<(), RuntimeError> {
        // Override the entrypoint so model images with their own
        // entrypoints stay idle until we exec into them
        let output = self
            .invoke_checked(&[
                "run",
                "-d",
                "--name",
                unit,
                "--entrypoint",
                "/bin/sh",
                image,
                "-c",
                "sleep infinity",
            ])
            .await?;

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("Unit {} created from {} with ID: {}", unit, image, container_id);

        Ok(())
    }

    async fn copy_in(&self, unit: &str, local: &Path, remote: &str) -> Result<(), RuntimeError> {
        let source = local.to_string_lossy();
        let target = format!("{}:{}", unit, remote);
        self.invoke_checked(&["cp", &source, &target]).await?;
        Ok(())
    }

    async fn exec(&self, unit: &str, argv: &[String]) -> Result<ExecOutput, RuntimeError> {
        let mut args: Vec<&str> = vec!["exec", unit];
        args.extend(argv.iter().map(String::as_str));

        let output = self.invoke(&args).await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }

    async fn copy_out(&self, unit: &str, remote: &str, local: &Path) -> Result<(), RuntimeError> {
        let source = format!("{}:{}", unit, remote);
        let target = local.to_string_lossy();
        self.invoke_checked(&["cp", &source, &target]).await?;
        Ok(())
    }
}
