//! Per-run resource scope
//!
//! Owns everything a run creates outside the cache stores: the private
//! staging directory (archive assembly, shared checkouts) and the installer
//! manifests generated in the working directory. [`RunScope::cleanup`]
//! releases them; dropping the scope is the fallback for paths that never
//! reach it.

use crate::error::{DepcacheError, DepcacheResult};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;
use tracing::{debug, warn};

pub struct RunScope {
    work_dir: PathBuf,
    staging: Mutex<Option<TempDir>>,
    generated: Mutex<Vec<PathBuf>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RunScope {
    /// Open a scope for a run in `work_dir`, creating its staging directory
    pub fn new(work_dir: impl Into<PathBuf>) -> DepcacheResult<Self> {
        let staging = tempfile::Builder::new()
            .prefix("depcache-")
            .tempdir()
            .map_err(|e| DepcacheError::io("creating staging directory", e))?;
        debug!("Staging in {}", staging.path().display());

        Ok(Self {
            work_dir: work_dir.into(),
            staging: Mutex::new(Some(staging)),
            generated: Mutex::new(Vec::new()),
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Root of the run's staging area
    pub fn staging_root(&self) -> DepcacheResult<PathBuf> {
        lock(&self.staging)
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| DepcacheError::Internal("run scope used after cleanup".to_string()))
    }

    /// A fresh private directory inside the staging area
    pub fn staging_dir(&self, prefix: &str) -> DepcacheResult<TempDir> {
        let root = self.staging_root()?;
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&root)
            .map_err(|e| {
                DepcacheError::io(format!("creating staging directory in {}", root.display()), e)
            })
    }

    /// Register a file generated in the working directory for removal
    pub fn track_generated(&self, path: PathBuf) {
        lock(&self.generated).push(path);
    }

    /// Remove generated files and the staging area. Safe to call repeatedly.
    pub async fn cleanup(&self) {
        let generated = std::mem::take(&mut *lock(&self.generated));
        for path in generated {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Removed generated {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        let staging = lock(&self.staging).take();
        if let Some(dir) = staging {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove staging directory {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        for path in std::mem::take(&mut *lock(&self.generated)) {
            let _ = std::fs::remove_file(path);
        }
        // The staging TempDir removes itself when dropped
    }
}
