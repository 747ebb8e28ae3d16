//! Shared cache tier
//!
//! Entries live as plain files at the root of a version-controlled
//! repository that every build agent can reach. Agents never coordinate:
//! every operation starts from a fresh listing, and the repository's atomic
//! commit is what keeps concurrent publishers safe.
//!
//! All working copies are private staging checkouts created under the
//! run's staging root and removed when the operation finishes.

use crate::cache::{CacheEntry, CacheTier, FetchedEntry, PublishOutcome, Tier};
use crate::error::{DepcacheError, DepcacheResult};
use crate::repository::RepositoryClient;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Cache tier backed by a shared repository
#[derive(Clone)]
pub struct SharedCacheStore {
    client: Arc<dyn RepositoryClient>,
    staging_root: PathBuf,
}

impl SharedCacheStore {
    pub fn new(client: Arc<dyn RepositoryClient>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            staging_root: staging_root.into(),
        }
    }

    pub fn location(&self) -> &str {
        self.client.location()
    }

    /// Fresh metadata-only checkout together with the current listing
    async fn snapshot(&self) -> DepcacheResult<(TempDir, BTreeSet<String>)> {
        let wc = tempfile::Builder::new()
            .prefix("shared-")
            .tempdir_in(&self.staging_root)
            .map_err(|e| DepcacheError::io("creating shared checkout directory", e))?;

        self.client.checkout_metadata(wc.path()).await?;
        let names = self.client.list(wc.path()).await?.into_iter().collect();
        Ok((wc, names))
    }

    /// Names of every file currently in the shared repository
    pub async fn list(&self) -> DepcacheResult<Vec<String>> {
        let (_wc, names) = self.snapshot().await?;
        Ok(names.into_iter().collect())
    }

    /// Delete `targets` in one commit. If the commit fails the listing is
    /// refreshed and whatever is still present is retried once, so files
    /// removed concurrently by another agent do not fail the invalidation.
    async fn delete(&self, targets: Vec<String>, message: &str) -> DepcacheResult<Vec<String>> {
        if targets.is_empty() {
            return Ok(targets);
        }

        let first = match self.client.remove(&targets, message).await {
            Ok(()) => return Ok(targets),
            Err(e) => e,
        };
        warn!("Shared removal failed, re-checking listing: {}", first);

        let (_wc, current) = self.snapshot().await?;
        let remaining: Vec<String> =
            targets.into_iter().filter(|name| current.contains(name)).collect();
        if remaining.is_empty() {
            debug!("Targets already removed by another writer");
            return Ok(remaining);
        }

        self.client.remove(&remaining, message).await?;
        Ok(remaining)
    }
}

fn contains_entry(names: &BTreeSet<String>, entry: &CacheEntry) -> bool {
    entry.blob_names().iter().all(|name| names.contains(name))
}

#[async_trait]
impl CacheTier for SharedCacheStore {
    fn tier(&self) -> Tier {
        Tier::Shared
    }

    async fn exists(&self, entry: &CacheEntry) -> DepcacheResult<bool> {
        let (_wc, names) = self.snapshot().await?;
        Ok(contains_entry(&names, entry))
    }

    async fn fetch(&self, entry: &CacheEntry) -> DepcacheResult<Option<FetchedEntry>> {
        let (wc, names) = self.snapshot().await?;
        if !contains_entry(&names, entry) {
            debug!("{} not in shared cache {}", entry, self.location());
            return Ok(None);
        }

        let blobs = entry.blob_names();
        self.client.update(wc.path(), &blobs).await?;

        for name in &blobs {
            if !wc.path().join(name).is_file() {
                return Err(DepcacheError::Internal(format!(
                    "{name} listed in shared cache but missing after update"
                )));
            }
        }

        info!("Fetched {} from shared cache", entry);
        Ok(Some(FetchedEntry::staged(wc)))
    }

    async fn publish(&self, entry: &CacheEntry, blob_dir: &Path) -> DepcacheResult<PublishOutcome> {
        let (wc, names) = self.snapshot().await?;
        if contains_entry(&names, entry) {
            debug!("{} already in shared cache", entry);
            return Ok(PublishOutcome::AlreadyPresent);
        }

        // A partially present entry only needs its missing blobs
        let missing: Vec<String> = entry
            .blob_names()
            .into_iter()
            .filter(|name| !names.contains(name))
            .collect();

        for name in &missing {
            let src = blob_dir.join(name);
            tokio::fs::copy(&src, wc.path().join(name))
                .await
                .map_err(|e| {
                    DepcacheError::io(format!("copying {} into shared checkout", src.display()), e)
                })?;
        }

        self.client.add(wc.path(), &missing).await?;

        let message = format!("depcache: add cache entry {entry}");
        match self.client.commit(wc.path(), &message).await {
            Ok(()) => {
                info!("Published {} to shared cache {}", entry, self.location());
                Ok(PublishOutcome::Published)
            }
            Err(e) if e.is_conflict() => {
                debug!("Commit of {} conflicted, re-checking listing", entry);
                if self.exists(entry).await? {
                    info!("{} was published concurrently by another agent", entry);
                    Ok(PublishOutcome::AlreadyPresent)
                } else {
                    Err(DepcacheError::Publish {
                        tier: Tier::Shared,
                        reason: e.to_string(),
                    })
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn remove_one(&self, entry: &CacheEntry) -> DepcacheResult<Vec<String>> {
        let (_wc, names) = self.snapshot().await?;
        let targets: Vec<String> = entry
            .blob_names()
            .into_iter()
            .filter(|name| names.contains(name))
            .collect();

        if targets.is_empty() {
            info!("{} not in shared cache, nothing to remove", entry);
            return Ok(targets);
        }

        let removed = self
            .delete(targets, &format!("depcache: remove cache entry {entry}"))
            .await?;
        info!("Removed {} shared blob(s) for {}", removed.len(), entry);
        Ok(removed)
    }

    async fn remove_all(&self, keep: Option<&CacheEntry>) -> DepcacheResult<Vec<String>> {
        let (_wc, names) = self.snapshot().await?;
        let keep_names: BTreeSet<String> = keep
            .map(CacheEntry::blob_names)
            .unwrap_or_default()
            .into_iter()
            .collect();
        let targets: Vec<String> =
            names.into_iter().filter(|name| !keep_names.contains(name)).collect();

        if targets.is_empty() {
            info!("Shared cache {} has nothing to remove", self.location());
            return Ok(targets);
        }

        let message = match keep {
            Some(entry) => format!("depcache: remove all cache entries except {entry}"),
            None => "depcache: remove all cache entries".to_string(),
        };
        let removed = self.delete(targets, &message).await?;
        info!("Removed {} shared blob(s) from {}", removed.len(), self.location());
        Ok(removed)
    }
}
