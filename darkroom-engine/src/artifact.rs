//! Local artifact staging
//!
//! Every file a pipeline downloads or receives from a stage lives under the
//! staging directory for the duration of one run. Paths are registered in
//! an [`ArtifactScope`] the moment they are reserved, before anything is
//! written to them, and the scope deletes each registered path exactly once:
//! on [`ArtifactScope::release`] for normal exits, or on drop when the run
//! is abandoned mid-flight.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Staging directory shared by all pipeline runs of the process
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens the staging directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        debug!("Artifact staging directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens a cleanup scope for one pipeline run
    pub fn scope(&self, request_id: Uuid) -> ArtifactScope {
        ArtifactScope {
            root: self.root.clone(),
            request_id,
            next: AtomicUsize::new(0),
            paths: Mutex::new(Vec::new()),
        }
    }
}

/// Set of staged files owned by one pipeline run
#[derive(Debug)]
pub struct ArtifactScope {
    root: PathBuf,
    request_id: Uuid,
    next: AtomicUsize,
    paths: Mutex<Vec<PathBuf>>,
}

impl ArtifactScope {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Reserves a fresh staged path and registers it for cleanup
    pub fn reserve(&self, label: &str, extension: &str) -> PathBuf {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        let path = self.root.join(format!(
            "{}-{:02}-{}.{}",
            self.request_id, seq, label, extension
        ));

        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.clone());

        path
    }

    /// Paths registered and not yet released
    pub fn registered(&self) -> Vec<PathBuf> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deletes every registered path
    ///
    /// Returns how many files were actually removed. Missing files are
    /// skipped silently and other failures are logged, never returned.
    /// Calling it again only touches paths reserved since the last call.
    pub async fn release(&self) -> usize {
        let paths = self.take();
        let mut removed = 0;

        for path in paths {
            if discard(&path, tokio::fs::remove_file(&path).await) {
                removed += 1;
            }
        }

        debug!(
            "Released {} staged artifact(s) for request {}",
            removed, self.request_id
        );
        removed
    }

    fn take(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.paths.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Drop for ArtifactScope {
    fn drop(&mut self) {
        let paths = self.take();
        if paths.is_empty() {
            return;
        }

        debug!(
            "Dropping scope for request {} with {} unreleased artifact(s)",
            self.request_id,
            paths.len()
        );
        for path in paths {
            discard(&path, std::fs::remove_file(&path));
        }
    }
}

/// Interprets the outcome of a delete; true when a file was removed
fn discard(path: &Path, result: std::io::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to delete staged artifact {}: {}", path.display(), e);
            false
        }
    }
}
