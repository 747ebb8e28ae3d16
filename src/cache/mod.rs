//! Tiered dependency cache
//!
//! Materialized dependency trees are archived under a fingerprint of the
//! manifest and stored in up to two cache tiers. The installer is the third,
//! authoritative tier and only produces fresh artifacts.
//!
//! # Tiers
//!
//! | Tier | Backing | Scope |
//! |------|---------|-------|
//! | Local | directory of archive files | one machine |
//! | Shared | version-controlled repository | every build agent |
//! | Installer | package manager run | authoritative |
//!
//! Entries are immutable once written: a different manifest yields a
//! different fingerprint and therefore a different entry.

pub mod archive;
pub mod fingerprint;
pub mod invalidate;
pub mod local;
pub mod shared;

pub use archive::{ArtifactArchiver, ARCHIVE_EXT};
pub use fingerprint::{fingerprint, Fingerprint};
pub use invalidate::{InvalidationReport, InvalidationService, InvalidationTarget};
pub use local::LocalCacheStore;
pub use shared::SharedCacheStore;

use crate::error::DepcacheResult;
use crate::manifest::{DependencyRoot, DependencyRoots, Variant};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Cache tiers in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Local,
    Shared,
    Installer,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Shared => write!(f, "shared"),
            Self::Installer => write!(f, "installer"),
        }
    }
}

/// The archive blobs stored for one fingerprint, one per dependency root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    fingerprint: Fingerprint,
    variant: Variant,
    roots: Vec<DependencyRoot>,
}

impl CacheEntry {
    pub fn new(fingerprint: Fingerprint, variant: Variant, roots: &DependencyRoots) -> Self {
        Self {
            fingerprint,
            variant,
            roots: roots.all().into_iter().cloned().collect(),
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn roots(&self) -> &[DependencyRoot] {
        &self.roots
    }

    /// Blob name for `root`: `<root-id>_<variant-marker>_<fingerprint>.<ext>`
    pub fn blob_name(&self, root: &DependencyRoot) -> String {
        format!(
            "{}_{}_{}.{}",
            root.id,
            self.variant.marker(),
            self.fingerprint,
            ARCHIVE_EXT
        )
    }

    /// Blob names of every root, in root order
    pub fn blob_names(&self) -> Vec<String> {
        self.roots.iter().map(|root| self.blob_name(root)).collect()
    }

    /// Short identifier used in logs and commit messages
    pub fn key(&self) -> String {
        format!("{}_{}", self.variant.marker(), self.fingerprint)
    }
}

impl fmt::Display for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Directory holding an entry's blobs, retrieved from a tier.
///
/// Shared fetches land in a staging checkout that is removed when this
/// value is dropped.
#[derive(Debug)]
pub struct FetchedEntry {
    dir: PathBuf,
    _staging: Option<TempDir>,
}

impl FetchedEntry {
    /// Blobs that live in a persistent directory
    pub fn in_place(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _staging: None,
        }
    }

    /// Blobs that live in a staging directory owned by this value
    pub fn staged(staging: TempDir) -> Self {
        Self {
            dir: staging.path().to_path_buf(),
            _staging: Some(staging),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Result of a successful publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The entry was written by this call
    Published,
    /// The entry already existed, possibly written by a concurrent agent
    AlreadyPresent,
}

/// A cache tier that can store and serve entries
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Which tier this is
    fn tier(&self) -> Tier;

    /// Whether every blob of `entry` is present
    async fn exists(&self, entry: &CacheEntry) -> DepcacheResult<bool>;

    /// Retrieve the entry's blobs; `None` is a cache miss
    async fn fetch(&self, entry: &CacheEntry) -> DepcacheResult<Option<FetchedEntry>>;

    /// Store the blobs found in `blob_dir`. Publishing an entry that already
    /// exists succeeds without writing.
    async fn publish(&self, entry: &CacheEntry, blob_dir: &Path) -> DepcacheResult<PublishOutcome>;

    /// Remove the entry's blobs, returning the names actually removed
    async fn remove_one(&self, entry: &CacheEntry) -> DepcacheResult<Vec<String>>;

    /// Remove every stored blob except those of `keep`, returning the names
    /// actually removed
    async fn remove_all(&self, keep: Option<&CacheEntry>) -> DepcacheResult<Vec<String>>;
}
