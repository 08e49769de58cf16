//! Stage execution
//!
//! A stage is one command run inside one execution unit:
//! 1. copy the local inputs into the unit
//! 2. run the rendered command
//! 3. copy the produced file back into the run's artifact scope
//! 4. delete the in-unit files (best-effort, always)
//!
//! Steps 1 to 3 share one deadline, the stage timeout. Each cleanup command
//! gets its own shorter deadline so a wedged unit cannot keep its lock.
//!
//! In-unit paths carry the request id, and the unit's lock is held for the
//! whole sequence, so concurrent requests never share files inside a unit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactScope;
use crate::lifecycle::LifecycleManager;
use crate::registry::{UnitRegistry, UnitSpec};
use crate::runtime::UnitRuntime;

/// Longest command output kept in error reports
const MAX_REPORTED_OUTPUT: usize = 2000;

/// Upper bound for one in-unit cleanup command
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Static description of a stage
///
/// `command` and `cleanup` are argv templates. `{slot}` placeholders are
/// replaced with the in-unit path of that input, `{output}` with the
/// in-unit output path and any other `{name}` with the stage parameter of
/// that name.
#[derive(Debug, Clone, Copy)]
pub struct StageDescriptor {
    pub name: &'static str,
    /// Logical model name resolved through the registry
    pub unit: &'static str,
    pub inputs: &'static [&'static str],
    pub command: &'static [&'static str],
    pub cleanup: Option<&'static [&'static str]>,
    pub output_ext: &'static str,
}

/// Stage failures
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Execution unit '{unit}' is unavailable: {reason}")]
    ContainerUnavailable { unit: String, reason: String },

    #[error("Command exited with code {exit_code}: {output}")]
    ExecutionFailed { exit_code: i32, output: String },

    #[error("Stage produced an empty output")]
    EmptyOutput,

    #[error("Stage timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Failed to {step}: {reason}")]
    Transfer { step: &'static str, reason: String },

    #[error("Invalid stage template: {0}")]
    Template(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs stages against execution units
#[derive(Clone)]
pub struct StageExecutor {
    runtime: Arc<dyn UnitRuntime>,
    lifecycle: LifecycleManager,
    registry: Arc<UnitRegistry>,
    timeout: Duration,
    cleanup_timeout: Duration,
    work_dir: String,
}

impl StageExecutor {
    /// Creates an executor
    ///
    /// # Arguments
    /// * `runtime` - Process boundary to the units
    /// * `registry` - Unit lookup and per-unit locks
    /// * `timeout` - Upper bound for copying in, running and copying out
    /// * `work_dir` - Directory inside units for staged files (e.g. "/tmp")
    pub fn new(
        runtime: Arc<dyn UnitRuntime>,
        registry: Arc<UnitRegistry>,
        timeout: Duration,
        work_dir: impl Into<String>,
    ) -> Self {
        Self {
            lifecycle: LifecycleManager::new(Arc::clone(&runtime)),
            runtime,
            registry,
            timeout,
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
            work_dir: work_dir.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// Runs one stage and returns the staged local output
    ///
    /// # Arguments
    /// * `scope` - Artifact scope of the run; the output path is registered there
    /// * `descriptor` - The stage to run
    /// * `inputs` - Local file for each input slot of the descriptor
    /// * `params` - Values for the non-path placeholders of the templates
    ///
    /// The local inputs are left untouched.
    pub async fn run_stage(
        &self,
        scope: &ArtifactScope,
        descriptor: &StageDescriptor,
        inputs: &[(&str, &Path)],
        params: &[(&str, String)],
    ) -> Result<PathBuf, StageError> {
        let (unit, lock) = self.registry.resolve(descriptor.unit).ok_or_else(|| {
            StageError::ContainerUnavailable {
                unit: descriptor.unit.to_string(),
                reason: "no execution unit registered for this model".to_string(),
            }
        })?;

        let plan = self.plan(scope, descriptor, inputs, params)?;

        let _guard = lock.lock().await;
        debug!(
            "Acquired unit {} for stage '{}' of request {}",
            unit.name,
            descriptor.name,
            scope.request_id()
        );

        self.lifecycle.ensure_running(unit).await?;

        let execute = self.execute(scope, unit, descriptor, &plan);
        let result = match tokio::time::timeout(self.timeout, execute).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Stage '{}' in unit {} timed out after {:?}",
                    descriptor.name, unit.name, self.timeout
                );
                Err(StageError::Timeout {
                    after: self.timeout,
                })
            }
        };
        self.cleanup_unit(unit, descriptor, &plan).await;

        result
    }

    /// Renders in-unit paths and argv for one invocation
    fn plan(
        &self,
        scope: &ArtifactScope,
        descriptor: &StageDescriptor,
        inputs: &[(&str, &Path)],
        params: &[(&str, String)],
    ) -> Result<StagePlan, StageError> {
        let prefix = format!(
            "{}/darkroom-{}-{}",
            self.work_dir,
            scope.request_id(),
            descriptor.name
        );

        let mut bindings: HashMap<&str, String> = HashMap::new();
        let mut copies = Vec::with_capacity(descriptor.inputs.len());

        for slot in descriptor.inputs {
            let local = inputs
                .iter()
                .find(|(name, _)| name == slot)
                .map(|(_, path)| path.to_path_buf())
                .ok_or_else(|| {
                    StageError::Template(format!(
                        "stage '{}' is missing input '{}'",
                        descriptor.name, slot
                    ))
                })?;
            let ext = local
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("png");
            let remote = format!("{}-{}.{}", prefix, slot, ext);
            bindings.insert(slot, remote.clone());
            copies.push((local, remote));
        }

        let output = format!("{}-out.{}", prefix, descriptor.output_ext);
        bindings.insert("output", output.clone());

        for (key, value) in params {
            bindings.insert(key, value.clone());
        }

        let argv = render(descriptor.command, &bindings)?;
        let cleanup = descriptor
            .cleanup
            .map(|template| render(template, &bindings))
            .transpose()?;

        Ok(StagePlan {
            copies,
            output,
            argv,
            cleanup,
        })
    }

    async fn execute(
        &self,
        scope: &ArtifactScope,
        unit: &UnitSpec,
        descriptor: &StageDescriptor,
        plan: &StagePlan,
    ) -> Result<PathBuf, StageError> {
        for (local, remote) in &plan.copies {
            self.runtime
                .copy_in(&unit.name, local, remote)
                .await
                .map_err(|e| StageError::Transfer {
                    step: "copy input into unit",
                    reason: e.to_string(),
                })?;
        }

        info!(
            "Running stage '{}' in unit {}: {}",
            descriptor.name,
            unit.name,
            plan.argv.join(" ")
        );

        let exec = self
            .runtime
            .exec(&unit.name, &plan.argv)
            .await
            .map_err(|e| StageError::Transfer {
                step: "invoke command",
                reason: e.to_string(),
            })?;

        if !exec.success() {
            return Err(StageError::ExecutionFailed {
                exit_code: exec.exit_code,
                output: tail(&exec.output, MAX_REPORTED_OUTPUT),
            });
        }

        let local = scope.reserve(descriptor.name, descriptor.output_ext);
        self.runtime
            .copy_out(&unit.name, &plan.output, &local)
            .await
            .map_err(|e| StageError::Transfer {
                step: "copy output out of unit",
                reason: e.to_string(),
            })?;

        let size = tokio::fs::metadata(&local).await?.len();
        if size == 0 {
            return Err(StageError::EmptyOutput);
        }

        debug!(
            "Stage '{}' produced {} byte(s) at {}",
            descriptor.name,
            size,
            local.display()
        );
        Ok(local)
    }

    /// Removes the stage's files inside the unit; never fails
    async fn cleanup_unit(&self, unit: &UnitSpec, descriptor: &StageDescriptor, plan: &StagePlan) {
        let mut argv = vec!["rm".to_string(), "-f".to_string()];
        argv.extend(plan.copies.iter().map(|(_, remote)| remote.clone()));
        argv.push(plan.output.clone());

        let mut commands = vec![argv];
        if let Some(extra) = &plan.cleanup {
            commands.push(extra.clone());
        }

        for argv in commands {
            let exec = self.runtime.exec(&unit.name, &argv);
            match tokio::time::timeout(self.cleanup_timeout, exec).await {
                Err(_) => warn!(
                    "Cleanup after stage '{}' in unit {} timed out after {:?}",
                    descriptor.name, unit.name, self.cleanup_timeout
                ),
                Ok(Ok(out)) if out.success() => {}
                Ok(Ok(out)) => warn!(
                    "Cleanup after stage '{}' in unit {} exited with {}: {}",
                    descriptor.name,
                    unit.name,
                    out.exit_code,
                    out.output.trim()
                ),
                Ok(Err(e)) => warn!(
                    "Cleanup after stage '{}' in unit {} failed: {}",
                    descriptor.name, unit.name, e
                ),
            }
        }
    }
}

#[derive(Debug)]
struct StagePlan {
    copies: Vec<(PathBuf, String)>,
    output: String,
    argv: Vec<String>,
    cleanup: Option<Vec<String>>,
}

/// Substitutes `{name}` placeholders in every argv token
fn render(template: &[&str], bindings: &HashMap<&str, String>) -> Result<Vec<String>, StageError> {
    template
        .iter()
        .map(|token| {
            let mut rendered = token.to_string();
            for (key, value) in bindings {
                rendered = rendered.replace(&format!("{{{}}}", key), value);
            }
            if let Some(start) = rendered.find('{') {
                if rendered[start..].contains('}') {
                    return Err(StageError::Template(format!(
                        "unbound placeholder in '{}'",
                        token
                    )));
                }
            }
            Ok(rendered)
        })
        .collect()
}

fn tail(output: &str, max: usize) -> String {
    let trimmed = output.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - max;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}
