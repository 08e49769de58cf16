//! Execution unit lifecycle
//!
//! Units are created lazily on first use and then reused for every later
//! request. This module only ever brings units up; it never stops them.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::registry::UnitSpec;
use crate::runtime::{UnitRuntime, UnitState};
use crate::stage::StageError;

/// Brings execution units up on demand
#[derive(Clone)]
pub struct LifecycleManager {
    runtime: Arc<dyn UnitRuntime>,
}

impl LifecycleManager {
    pub fn new(runtime: Arc<dyn UnitRuntime>) -> Self {
        Self { runtime }
    }

    /// Ensures the unit is running
    ///
    /// Running units return immediately, stopped units are started and
    /// missing units are created from their image. Idempotent.
    pub async fn ensure_running(&self, unit: &UnitSpec) -> Result<(), StageError> {
        let state = match self.runtime.probe(&unit.name).await {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to probe unit {}: {}", unit.name, e);
                return Err(unavailable(unit, e.to_string()));
            }
        };

        match state {
            UnitState::Running => {
                debug!("Unit {} is already running", unit.name);
                return Ok(());
            }
            UnitState::Stopped => {
                info!("Starting stopped unit {}", unit.name);
                match self.runtime.start(&unit.name).await {
                    Ok(()) => return Ok(()),
                    Err(e) => warn!(
                        "Failed to start unit {}, recreating it: {}",
                        unit.name, e
                    ),
                }
            }
            UnitState::Absent => {}
        }

        info!("Creating unit {} from image {}", unit.name, unit.image);
        self.runtime
            .create(&unit.name, &unit.image)
            .await
            .map_err(|e| {
                error!("Failed to create unit {}: {}", unit.name, e);
                unavailable(unit, e.to_string())
            })
    }
}

fn unavailable(unit: &UnitSpec, reason: String) -> StageError {
    StageError::ContainerUnavailable {
        unit: unit.name.clone(),
        reason,
    }
}
