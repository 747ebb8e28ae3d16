//! Configuration schema for depcache
//!
//! The project file `depcache.toml` holds both the storage settings and the
//! dependency declarations.

use crate::cache::InvalidationTarget;
use crate::manifest::{DependencyRoots, DependencySpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache storage locations
    pub storage: StorageConfig,

    /// Shared repository client settings
    pub shared: SharedConfig,

    /// Installer invocation
    pub installer: InstallerConfig,

    /// Dependency root directories
    pub roots: RootsConfig,

    /// Invalidation to perform before resolving
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_load: Option<BeforeLoadConfig>,

    /// Dependencies installed for every variant
    pub dependencies: Vec<DependencySpec>,

    /// Dependencies added for the development variant
    pub dev_dependencies: Vec<DependencySpec>,

    /// Version resolutions forwarded to the vcs installer
    pub resolutions: BTreeMap<String, String>,
}

impl Config {
    /// Dependency roots as declared in `[roots]`
    pub fn dependency_roots(&self) -> DependencyRoots {
        DependencyRoots::new(&self.roots.registry, &self.roots.vcs)
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable audit logging of shared cache mutations
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { audit_log: true }
    }
}

/// Cache storage locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Local cache directory, relative paths resolve against the config file
    pub local: Option<PathBuf>,

    /// Shared repository URL; unset disables the shared tier
    pub shared: Option<String>,
}

/// Shared repository client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedConfig {
    /// Repository client executable
    pub command: String,

    /// Upper bound for each repository command (0 = unbounded)
    pub command_timeout_secs: u64,
}

impl SharedConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            command: "svn".to_string(),
            command_timeout_secs: 300,
        }
    }
}

/// Installer invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Commands run in order, each as argv
    pub commands: Vec<Vec<String>>,

    /// Total time budget for all installer commands
    pub timeout_secs: u64,
}

impl InstallerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            commands: vec![
                vec!["npm".to_string(), "install".to_string()],
                vec!["bower".to_string(), "install".to_string()],
            ],
            timeout_secs: 900,
        }
    }
}

/// Dependency root directories, relative to the working directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RootsConfig {
    pub registry: PathBuf,
    pub vcs: PathBuf,
}

impl Default for RootsConfig {
    fn default() -> Self {
        Self {
            registry: PathBuf::from("node_modules"),
            vcs: PathBuf::from("libs"),
        }
    }
}

/// Bulk invalidation run before every install
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeforeLoadConfig {
    pub invalidate: BeforeLoadAction,

    #[serde(default = "default_before_load_target")]
    pub target: InvalidationTarget,
}

fn default_before_load_target() -> InvalidationTarget {
    InvalidationTarget::Both
}

/// Which bulk invalidation to run before loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BeforeLoadAction {
    All,
    AllExceptCurrent,
}
