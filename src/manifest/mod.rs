//! Dependency manifest model
//!
//! A manifest is the validated, variant-specific view of the dependencies
//! declared in `depcache.toml`. It is the sole input to fingerprinting and
//! to the generated installer manifests.

pub mod ecosystem;

use crate::config::Config;
use crate::error::{DepcacheError, DepcacheResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Where a dependency is installed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Package registry (npm)
    Registry,
    /// Version-control checkout (bower, `repo#ref`)
    Vcs,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry => write!(f, "registry"),
            Self::Vcs => write!(f, "vcs"),
        }
    }
}

/// A single declared dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Package name, unique within a variant
    pub name: String,

    /// Source kind
    pub kind: DependencyKind,

    /// Registry version or range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Repository URL for vcs dependencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    /// Commit, tag or branch for vcs dependencies
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Shell command run inside the installed package after a successful load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postinstall: Option<String>,
}

impl DependencySpec {
    /// Registry dependency pinned to `version`
    pub fn registry(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DependencyKind::Registry,
            version: Some(version.into()),
            repo: None,
            reference: None,
            postinstall: None,
        }
    }

    /// Vcs dependency pinned to `reference`
    pub fn vcs(
        name: impl Into<String>,
        repo: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: DependencyKind::Vcs,
            version: None,
            repo: Some(repo.into()),
            reference: Some(reference.into()),
            postinstall: None,
        }
    }

    /// Attach a postinstall command
    pub fn with_postinstall(mut self, command: impl Into<String>) -> Self {
        self.postinstall = Some(command.into());
        self
    }

    fn validate(&self) -> DepcacheResult<()> {
        let invalid = |reason: &str| DepcacheError::InvalidDependency {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }

        match self.kind {
            DependencyKind::Registry => {
                if self.version.as_deref().map_or(true, |v| v.trim().is_empty()) {
                    return Err(invalid("registry dependencies need a version"));
                }
            }
            DependencyKind::Vcs => {
                if self.repo.as_deref().map_or(true, |r| r.trim().is_empty()) {
                    return Err(invalid("vcs dependencies need a repo"));
                }
                if self.reference.as_deref().map_or(true, |r| r.trim().is_empty()) {
                    return Err(invalid("vcs dependencies need a ref"));
                }
            }
        }

        Ok(())
    }
}

/// Build mode selecting which dependency sets are installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Production,
    Development,
}

impl Variant {
    /// Short marker embedded in cache entry names
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Production => "prod",
            Self::Development => "dev",
        }
    }

    /// Variant selected by the `--dev` flag
    pub fn from_dev_flag(dev: bool) -> Self {
        if dev {
            Self::Development
        } else {
            Self::Production
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
        }
    }
}

/// A directory in the working tree that receives installed dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRoot {
    /// Identifier used in cache entry names
    pub id: String,
    /// Path relative to the working directory
    pub path: PathBuf,
}

impl DependencyRoot {
    /// Create a root from a relative path; the id is the path with
    /// separators flattened
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("-");
        Self { id, path }
    }

    /// Absolute location of this root under `work_dir`
    pub fn resolve(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.path)
    }

    /// Unpacking clears the root, so it must stay strictly below the
    /// working directory
    fn validate(&self) -> DepcacheResult<()> {
        let invalid = |reason: &str| DepcacheError::InvalidRoot {
            path: self.path.clone(),
            reason: reason.to_string(),
        };

        let mut named = false;
        for component in self.path.components() {
            match component {
                Component::Normal(_) => named = true,
                Component::CurDir => {}
                Component::ParentDir => return Err(invalid("must not contain `..`")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("must be a relative path"))
                }
            }
        }
        if !named {
            return Err(invalid("must name a directory below the working directory"));
        }
        Ok(())
    }

    fn normalized(&self) -> PathBuf {
        self.path.components().filter(|c| !matches!(c, Component::CurDir)).collect()
    }
}

/// The registry and vcs dependency roots of a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRoots {
    pub registry: DependencyRoot,
    pub vcs: DependencyRoot,
}

impl DependencyRoots {
    pub fn new(registry: impl Into<PathBuf>, vcs: impl Into<PathBuf>) -> Self {
        Self {
            registry: DependencyRoot::new(registry),
            vcs: DependencyRoot::new(vcs),
        }
    }

    /// Root receiving dependencies of `kind`
    pub fn for_kind(&self, kind: DependencyKind) -> &DependencyRoot {
        match kind {
            DependencyKind::Registry => &self.registry,
            DependencyKind::Vcs => &self.vcs,
        }
    }

    /// All roots in archive order
    pub fn all(&self) -> [&DependencyRoot; 2] {
        [&self.registry, &self.vcs]
    }

    /// Reject roots outside the working directory and roots that overlap,
    /// since both are cleared and extracted concurrently
    pub fn validate(&self) -> DepcacheResult<()> {
        self.registry.validate()?;
        self.vcs.validate()?;

        let (registry, vcs) = (self.registry.normalized(), self.vcs.normalized());
        if registry.starts_with(&vcs) || vcs.starts_with(&registry) {
            return Err(DepcacheError::InvalidRoot {
                path: self.vcs.path.clone(),
                reason: format!("overlaps the registry root {}", self.registry.path.display()),
            });
        }
        if self.registry.id == self.vcs.id {
            return Err(DepcacheError::InvalidRoot {
                path: self.vcs.path.clone(),
                reason: format!("has the same cache name `{}` as the registry root", self.vcs.id),
            });
        }
        Ok(())
    }
}

impl Default for DependencyRoots {
    fn default() -> Self {
        Self::new("node_modules", "libs")
    }
}

/// Command executed inside an installed dependency after a successful load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostinstallHook {
    pub working_path: PathBuf,
    pub command: String,
}

/// Validated dependency set for one variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyManifest {
    variant: Variant,
    dependencies: Vec<DependencySpec>,
    resolutions: BTreeMap<String, String>,
}

impl DependencyManifest {
    /// Validate and normalize a dependency list.
    ///
    /// Dependencies are ordered by name: the generated installer manifests
    /// are name-keyed maps, so declaration order carries no meaning.
    pub fn new(
        variant: Variant,
        mut dependencies: Vec<DependencySpec>,
        resolutions: BTreeMap<String, String>,
    ) -> DepcacheResult<Self> {
        if dependencies.is_empty() {
            return Err(DepcacheError::EmptyManifest {
                variant: variant.to_string(),
            });
        }

        let mut seen = HashSet::new();
        for dep in &dependencies {
            dep.validate()?;
            if !seen.insert(dep.name.as_str()) {
                return Err(DepcacheError::DuplicateDependency(dep.name.clone()));
            }
        }

        dependencies.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            variant,
            dependencies,
            resolutions,
        })
    }

    /// Build the manifest for `variant` from the project configuration.
    ///
    /// The development variant installs `dev_dependencies` on top of
    /// `dependencies`.
    pub fn from_config(config: &Config, variant: Variant) -> DepcacheResult<Self> {
        let mut dependencies = config.dependencies.clone();
        if variant == Variant::Development {
            dependencies.extend(config.dev_dependencies.iter().cloned());
        }
        Self::new(variant, dependencies, config.resolutions.clone())
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn dependencies(&self) -> &[DependencySpec] {
        &self.dependencies
    }

    pub fn resolutions(&self) -> &BTreeMap<String, String> {
        &self.resolutions
    }

    /// Dependencies of one kind, in canonical order
    pub fn of_kind(&self, kind: DependencyKind) -> impl Iterator<Item = &DependencySpec> {
        self.dependencies.iter().filter(move |d| d.kind == kind)
    }

    /// Postinstall hooks resolved against the working tree
    pub fn postinstall_hooks(
        &self,
        work_dir: &Path,
        roots: &DependencyRoots,
    ) -> Vec<PostinstallHook> {
        self.dependencies
            .iter()
            .filter_map(|dep| {
                dep.postinstall.as_ref().map(|command| PostinstallHook {
                    working_path: roots.for_kind(dep.kind).resolve(work_dir).join(&dep.name),
                    command: command.clone(),
                })
            })
            .collect()
    }
}
