//! Configuration management for depcache

pub mod schema;

pub use schema::{BeforeLoadAction, BeforeLoadConfig, Config};

use crate::error::{DepcacheError, DepcacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Project configuration file name
pub const CONFIG_FILE_NAME: &str = "depcache.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager for `depcache.toml` in `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config_path: dir.join(CONFIG_FILE_NAME),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depcache")
    }

    /// Get the audit log path
    pub fn audit_log_path() -> PathBuf {
        Self::state_dir().join("audit.log")
    }

    /// Load the project configuration. A missing file is an error: there is
    /// nothing to resolve without declared dependencies.
    pub async fn load(&self) -> DepcacheResult<Config> {
        if !self.config_path.exists() {
            return Err(DepcacheError::ConfigNotFound(self.config_path.clone()));
        }

        debug!("Loading config from {}", self.config_path.display());
        let content = fs::read_to_string(&self.config_path).await.map_err(|e| {
            DepcacheError::io(format!("reading config from {}", self.config_path.display()), e)
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| DepcacheError::ConfigInvalid {
            path: self.config_path.clone(),
            reason: e.to_string(),
        })?;
        config.dependency_roots().validate()?;
        Ok(config)
    }

    /// Absolute local cache directory declared in `storage.local`
    pub fn local_store_path(&self, config: &Config) -> DepcacheResult<PathBuf> {
        let local = config
            .storage
            .local
            .as_ref()
            .ok_or(DepcacheError::MissingStorage("storage.local"))?;
        Ok(self.base_dir().join(local))
    }

    /// Directory that relative paths in the config resolve against
    pub fn base_dir(&self) -> PathBuf {
        match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}
