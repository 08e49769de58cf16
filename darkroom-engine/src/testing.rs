//! In-process fakes for the engine's external boundaries

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use darkroom_core::dto::edit::QualityReport;

use crate::classifier::{ClassifierAdapter, ClassifierError, Classification, IntentRoute};
use crate::runtime::{ExecOutput, RuntimeError, UnitRuntime, UnitState};

/// Bytes written by a successful fake stage
pub const FAKE_OUTPUT: &[u8] = b"\x89PNG\r\n\x1a\nfake-output";

/// How a fake unit answers model commands
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail(i32),
    Empty,
    Hang,
}

/// Unit runtime that keeps each unit's filesystem in a temp directory
///
/// Model commands write [`FAKE_OUTPUT`] to their last argument; `rm`
/// deletes the named files.
pub struct FakeRuntime {
    root: tempfile::TempDir,
    states: Mutex<HashMap<String, UnitState>>,
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<String>>,
    create_fails: Mutex<bool>,
    start_fails: Mutex<bool>,
    copy_in_hangs: Mutex<bool>,
    cleanup_hangs: Mutex<bool>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            states: Mutex::new(HashMap::new()),
            behaviors: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            create_fails: Mutex::new(false),
            start_fails: Mutex::new(false),
            copy_in_hangs: Mutex::new(false),
            cleanup_hangs: Mutex::new(false),
        }
    }

    pub fn set_state(&self, unit: &str, state: UnitState) {
        self.states.lock().unwrap().insert(unit.to_string(), state);
    }

    pub fn state(&self, unit: &str) -> UnitState {
        self.states
            .lock()
            .unwrap()
            .get(unit)
            .copied()
            .unwrap_or(UnitState::Absent)
    }

    pub fn set_behavior(&self, unit: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(unit.to_string(), behavior);
    }

    pub fn fail_create(&self) {
        *self.create_fails.lock().unwrap() = true;
    }

    pub fn fail_start(&self) {
        *self.start_fails.lock().unwrap() = true;
    }

    /// Makes every later `copy_in` block until cancelled
    pub fn hang_copy_in(&self, hang: bool) {
        *self.copy_in_hangs.lock().unwrap() = hang;
    }

    /// Makes every later `rm` block until cancelled
    pub fn hang_cleanup(&self, hang: bool) {
        *self.cleanup_hangs.lock().unwrap() = hang;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls starting with `prefix`
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Files currently present inside a unit
    pub fn unit_files(&self, unit: &str) -> Vec<PathBuf> {
        match std::fs::read_dir(self.root.path().join(unit)) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn unit_path(&self, unit: &str, remote: &str) -> PathBuf {
        let dir = self.root.path().join(unit);
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(remote.trim_start_matches('/').replace('/', "_"))
    }
}

async fn hang() {
    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
}

#[async_trait]
impl UnitRuntime for FakeRuntime {
    async fn probe(&self, unit: &str) -> Result<UnitState, RuntimeError> {
        self.record(format!("probe {}", unit));
        Ok(self.state(unit))
    }

    async fn start(&self, unit: &str) -> Result<(), RuntimeError> {
        self.record(format!("start {}", unit));
        if *self.start_fails.lock().unwrap() {
            return Err(RuntimeError::CommandFailed {
                command: "docker start".to_string(),
                exit_code: 1,
                stderr: "container is corrupt".to_string(),
            });
        }
        self.set_state(unit, UnitState::Running);
        Ok(())
    }

    async fn create(&self, unit: &str, image: &str) -> Result<(), RuntimeError> {
        self.record(format!("create {} {}", unit, image));
        if *self.create_fails.lock().unwrap() {
            return Err(RuntimeError::CommandFailed {
                command: "docker run".to_string(),
                exit_code: 125,
                stderr: "image not found".to_string(),
            });
        }
        self.set_state(unit, UnitState::Running);
        Ok(())
    }

    async fn copy_in(&self, unit: &str, local: &Path, remote: &str) -> Result<(), RuntimeError> {
        self.record(format!("copy_in {} {}", unit, remote));
        if *self.copy_in_hangs.lock().unwrap() {
            hang().await;
        }
        std::fs::copy(local, self.unit_path(unit, remote)).map_err(|source| RuntimeError::Spawn {
            binary: "fake".to_string(),
            source,
        })?;
        Ok(())
    }

    async fn exec(&self, unit: &str, argv: &[String]) -> Result<ExecOutput, RuntimeError> {
        self.record(format!("exec {} {}", unit, argv.join(" ")));

        if argv.first().map(String::as_str) == Some("rm") {
            if *self.cleanup_hangs.lock().unwrap() {
                hang().await;
            }
            for target in argv.iter().skip(1).filter(|a| !a.starts_with('-')) {
                let _ = std::fs::remove_file(self.unit_path(unit, target));
            }
            return Ok(ExecOutput {
                exit_code: 0,
                output: String::new(),
            });
        }

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(unit)
            .copied()
            .unwrap_or(Behavior::Succeed);
        let output = argv.last().map(|o| self.unit_path(unit, o));

        match behavior {
            Behavior::Succeed => {
                if let Some(output) = output {
                    std::fs::write(output, FAKE_OUTPUT).unwrap();
                }
                Ok(ExecOutput {
                    exit_code: 0,
                    output: "done".to_string(),
                })
            }
            Behavior::Empty => {
                if let Some(output) = output {
                    std::fs::write(output, b"").unwrap();
                }
                Ok(ExecOutput {
                    exit_code: 0,
                    output: String::new(),
                })
            }
            Behavior::Fail(code) => Ok(ExecOutput {
                exit_code: code,
                output: "model crashed".to_string(),
            }),
            Behavior::Hang => {
                hang().await;
                unreachable!("hanging command was not cancelled")
            }
        }
    }

    async fn copy_out(&self, unit: &str, remote: &str, local: &Path) -> Result<(), RuntimeError> {
        self.record(format!("copy_out {} {}", unit, remote));
        std::fs::copy(self.unit_path(unit, remote), local).map_err(|source| RuntimeError::Spawn {
            binary: "fake".to_string(),
            source,
        })?;
        Ok(())
    }
}

/// Classifier stub answering with fixed results
pub struct FakeClassifier {
    label: Option<String>,
    route: Option<Result<IntentRoute, ClassifierError>>,
    calls: Mutex<usize>,
}

impl FakeClassifier {
    /// Always labels images with `label`
    pub fn labelling(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            route: None,
            calls: Mutex::new(0),
        }
    }

    /// Fails every call
    pub fn failing() -> Self {
        Self {
            label: None,
            route: None,
            calls: Mutex::new(0),
        }
    }

    /// Answers intent routing with `route`
    pub fn routing(route: Result<IntentRoute, ClassifierError>) -> Self {
        Self {
            label: None,
            route: Some(route),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn tick(&self) {
        *self.calls.lock().unwrap() += 1;
    }
}

#[async_trait]
impl ClassifierAdapter for FakeClassifier {
    async fn classify(&self, _image: &[u8], _mime: &str) -> Result<Classification, ClassifierError> {
        self.tick();
        match &self.label {
            Some(label) => Ok(Classification {
                label: label.clone(),
                confidence: 0.9,
            }),
            None => Err(ClassifierError::Transport("connection refused".to_string())),
        }
    }

    async fn analyze_quality(&self, _image: &[u8]) -> Result<QualityReport, ClassifierError> {
        self.tick();
        match &self.label {
            Some(_) => Ok(QualityReport {
                needed_enhancements: vec!["denoise".to_string()],
                severity: HashMap::from([("denoise".to_string(), 0.6)]),
                degraded: false,
            }),
            None => Err(ClassifierError::Transport("connection refused".to_string())),
        }
    }

    async fn route_intent(
        &self,
        _image: Option<&[u8]>,
        _text: &str,
    ) -> Result<IntentRoute, ClassifierError> {
        self.tick();
        match &self.route {
            Some(route) => route.clone(),
            None => Err(ClassifierError::Transport("connection refused".to_string())),
        }
    }
}
