//! Command line interface

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};

use crate::audit::AuditLog;
use crate::cache::{fingerprint, CacheEntry, InvalidationTarget, LocalCacheStore, SharedCacheStore};
use crate::config::{Config, ConfigManager};
use crate::error::{DepcacheError, DepcacheResult};
use crate::manifest::{DependencyManifest, Variant};
use crate::repository::SvnClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Loaded project configuration plus the global flags that shape a run
pub struct Project {
    pub manager: ConfigManager,
    pub config: Config,
    pub work_dir: PathBuf,
    pub variant: Variant,
    pub use_shared: bool,
    pub verbose: bool,
}

impl Project {
    /// Locate and load `depcache.toml`
    pub async fn load(cli: &Cli) -> DepcacheResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| DepcacheError::io("getting current directory", e))?;
        let manager = match &cli.config {
            Some(path) => ConfigManager::with_path(path.clone()),
            None => ConfigManager::in_dir(&cwd),
        };
        let config = manager.load().await?;
        let work_dir = cwd.join(manager.base_dir());
        debug!("Working directory {}", work_dir.display());

        Ok(Self {
            manager,
            config,
            work_dir,
            variant: Variant::from_dev_flag(cli.dev),
            use_shared: !cli.no_shared,
            verbose: cli.verbose > 0,
        })
    }

    /// Validated manifest of the selected variant
    pub fn manifest(&self) -> DepcacheResult<DependencyManifest> {
        DependencyManifest::from_config(&self.config, self.variant)
    }

    /// Cache entry of `manifest` under the configured roots
    pub fn entry(&self, manifest: &DependencyManifest) -> CacheEntry {
        CacheEntry::new(fingerprint(manifest), manifest.variant(), &self.config.dependency_roots())
    }

    pub fn local_store(&self) -> DepcacheResult<LocalCacheStore> {
        Ok(LocalCacheStore::new(self.manager.local_store_path(&self.config)?))
    }

    /// Shared store for this run, unless disabled by flag or configuration
    pub fn shared_store(&self, staging_root: &Path) -> Option<Arc<SharedCacheStore>> {
        if !self.use_shared {
            debug!("Shared cache disabled by --no-shared");
            return None;
        }

        let url = self.config.storage.shared.as_ref()?;
        let client = SvnClient::new(
            url.as_str(),
            self.config.shared.command.as_str(),
            self.config.shared.command_timeout(),
            self.verbose,
        );
        Some(Arc::new(SharedCacheStore::new(Arc::new(client), staging_root)))
    }

    /// Default invalidation target: both tiers when the shared one is in use
    pub fn default_target(&self) -> InvalidationTarget {
        if self.use_shared && self.config.storage.shared.is_some() {
            InvalidationTarget::Both
        } else {
            InvalidationTarget::Local
        }
    }

    pub fn audit(&self) -> AuditLog {
        AuditLog::new(&self.config)
    }
}
