//! Version-controlled repository abstraction
//!
//! The shared cache tier only needs a handful of repository operations. They
//! are expressed as a trait so the store can be driven by the real `svn`
//! client in production and by an in-memory repository in tests.

pub mod svn;

pub use svn::SvnClient;

use crate::error::DepcacheResult;
use async_trait::async_trait;
use std::path::Path;

/// Repository operations used by the shared cache tier
///
/// Working copies are always private staging directories owned by the
/// caller; they are never shared between operations of different runs.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Repository location for logs
    fn location(&self) -> &str;

    /// Create a metadata-only working copy in the empty directory `wc`
    async fn checkout_metadata(&self, wc: &Path) -> DepcacheResult<()>;

    /// File names currently at the head of the repository
    async fn list(&self, wc: &Path) -> DepcacheResult<Vec<String>>;

    /// Bring only `names` into the working copy
    async fn update(&self, wc: &Path, names: &[String]) -> DepcacheResult<()>;

    /// Schedule files already copied into `wc` for addition
    async fn add(&self, wc: &Path, names: &[String]) -> DepcacheResult<()>;

    /// Commit scheduled changes atomically. A rejection because another
    /// writer got there first is reported as `RepositoryConflict`.
    async fn commit(&self, wc: &Path, message: &str) -> DepcacheResult<()>;

    /// Delete `names` from the repository in a single commit
    async fn remove(&self, names: &[String], message: &str) -> DepcacheResult<()>;
}
