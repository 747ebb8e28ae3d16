//! Local disk cache tier
//!
//! A single directory of blob files named by [`CacheEntry::blob_name`].
//! Blobs are written under a temporary name and renamed into place, so a
//! concurrent reader never observes a partial file.
//!
//! Alongside the blobs, a `<key>.shared` marker records that the entry is
//! known to be present in the shared tier, letting a local hit skip the
//! shared write-through entirely. The marker lists the blob names it vouches
//! for; after the configured roots change it no longer matches.

use crate::cache::{CacheEntry, CacheTier, FetchedEntry, PublishOutcome, Tier};
use crate::error::{DepcacheError, DepcacheResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

const SHARED_MARKER_EXT: &str = "shared";

/// Directory-backed cache on the local machine
#[derive(Debug, Clone)]
pub struct LocalCacheStore {
    dir: PathBuf,
}

impl LocalCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn ensure_dir(&self) -> DepcacheResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| {
                DepcacheError::io(format!("creating local cache {}", self.dir.display()), e)
            })
    }

    fn marker_name(entry: &CacheEntry) -> String {
        format!("{}.{}", entry.key(), SHARED_MARKER_EXT)
    }

    /// Whether the shared tier is known to hold every blob of `entry`
    pub async fn is_shared_current(&self, entry: &CacheEntry) -> bool {
        match fs::read_to_string(self.dir.join(Self::marker_name(entry))).await {
            Ok(content) => content.lines().eq(entry.blob_names().iter().map(String::as_str)),
            Err(_) => false,
        }
    }

    /// Record that the shared tier holds `entry`
    pub async fn mark_shared_current(&self, entry: &CacheEntry) -> DepcacheResult<()> {
        self.ensure_dir().await?;
        let path = self.dir.join(Self::marker_name(entry));
        fs::write(&path, entry.blob_names().join("\n"))
            .await
            .map_err(|e| DepcacheError::io(format!("writing {}", path.display()), e))
    }

    /// Drop the shared marker of `entry`
    pub async fn forget_shared(&self, entry: &CacheEntry) -> DepcacheResult<()> {
        remove_if_exists(&self.dir.join(Self::marker_name(entry))).await?;
        Ok(())
    }

    /// Drop every shared marker except the one belonging to `keep`
    pub async fn forget_all_shared(&self, keep: Option<&CacheEntry>) -> DepcacheResult<()> {
        let keep_marker = keep.map(Self::marker_name);
        for name in self.file_names().await? {
            if is_marker(&name) && Some(&name) != keep_marker.as_ref() {
                remove_if_exists(&self.dir.join(&name)).await?;
            }
        }
        Ok(())
    }

    /// Names of regular files in the cache directory, skipping in-flight
    /// temporaries
    async fn file_names(&self) -> DepcacheResult<Vec<String>> {
        let mut names = Vec::new();

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => {
                return Err(DepcacheError::io(
                    format!("reading local cache {}", self.dir.display()),
                    e,
                ))
            }
        };

        while let Some(item) = entries
            .next_entry()
            .await
            .map_err(|e| DepcacheError::io("reading local cache entry", e))?
        {
            let name = item.file_name().to_string_lossy().into_owned();
            let is_file = item.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && !name.starts_with('.') {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    async fn write_blob(&self, src: &Path, name: &str) -> DepcacheResult<()> {
        let tmp = self.dir.join(format!(".{name}.{}.tmp", Uuid::new_v4()));
        let dest = self.dir.join(name);

        if let Err(e) = fs::copy(src, &tmp).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(DepcacheError::io(format!("copying {} into local cache", src.display()), e));
        }

        if let Err(e) = fs::rename(&tmp, &dest).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(DepcacheError::io(format!("renaming into {}", dest.display()), e));
        }

        Ok(())
    }
}

#[async_trait]
impl CacheTier for LocalCacheStore {
    fn tier(&self) -> Tier {
        Tier::Local
    }

    async fn exists(&self, entry: &CacheEntry) -> DepcacheResult<bool> {
        for name in entry.blob_names() {
            let path = self.dir.join(&name);
            let found = fs::try_exists(&path)
                .await
                .map_err(|e| DepcacheError::io(format!("checking {}", path.display()), e))?;
            debug!("{} exists: {}", path.display(), found);
            if !found {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn fetch(&self, entry: &CacheEntry) -> DepcacheResult<Option<FetchedEntry>> {
        if self.exists(entry).await? {
            Ok(Some(FetchedEntry::in_place(&self.dir)))
        } else {
            Ok(None)
        }
    }

    async fn publish(&self, entry: &CacheEntry, blob_dir: &Path) -> DepcacheResult<PublishOutcome> {
        if self.exists(entry).await? {
            debug!("{} already in local cache", entry);
            return Ok(PublishOutcome::AlreadyPresent);
        }

        self.ensure_dir().await?;
        for name in entry.blob_names() {
            self.write_blob(&blob_dir.join(&name), &name).await?;
        }

        info!("Stored {} in local cache {}", entry, self.dir.display());
        Ok(PublishOutcome::Published)
    }

    async fn remove_one(&self, entry: &CacheEntry) -> DepcacheResult<Vec<String>> {
        let mut removed = Vec::new();
        for name in entry.blob_names() {
            if remove_if_exists(&self.dir.join(&name)).await? {
                removed.push(name);
            }
        }
        self.forget_shared(entry).await?;

        info!("Removed {} local blob(s) for {}", removed.len(), entry);
        Ok(removed)
    }

    async fn remove_all(&self, keep: Option<&CacheEntry>) -> DepcacheResult<Vec<String>> {
        let mut keep_names: HashSet<String> = keep
            .map(CacheEntry::blob_names)
            .unwrap_or_default()
            .into_iter()
            .collect();
        if let Some(entry) = keep {
            keep_names.insert(Self::marker_name(entry));
        }

        let mut removed = Vec::new();
        for name in self.file_names().await? {
            if keep_names.contains(&name) {
                continue;
            }
            if remove_if_exists(&self.dir.join(&name)).await? && !is_marker(&name) {
                removed.push(name);
            }
        }

        info!("Removed {} local blob(s) from {}", removed.len(), self.dir.display());
        Ok(removed)
    }
}

fn is_marker(name: &str) -> bool {
    Path::new(name).extension().is_some_and(|ext| ext == SHARED_MARKER_EXT)
}

/// Remove a file, treating absence as success. Returns whether it existed.
async fn remove_if_exists(path: &Path) -> DepcacheResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DepcacheError::io(format!("removing {}", path.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Fingerprint;
    use crate::manifest::{DependencyRoots, Variant};
    use tempfile::TempDir;

    fn entry(fp: &str) -> CacheEntry {
        CacheEntry::new(Fingerprint::from_hex(fp), Variant::Production, &DependencyRoots::default())
    }

    fn blobs_for(dir: &Path, entry: &CacheEntry) {
        for name in entry.blob_names() {
            std::fs::write(dir.join(name), entry.fingerprint().as_str()).unwrap();
        }
    }

    #[tokio::test]
    async fn fetch_missing_is_soft_miss() {
        let dir = TempDir::new().unwrap();
        let store = LocalCacheStore::new(dir.path().join("never-created"));

        assert!(!store.exists(&entry("aa")).await.unwrap());
        assert!(store.fetch(&entry("aa")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = LocalCacheStore::new(dir.path());
        let e = entry("aa");
        std::fs::write(dir.path().join(&e.blob_names()[0]), "x").unwrap();

        assert!(store.fetch(&e).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publish_then_fetch() {
        let src = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let store = LocalCacheStore::new(dir.path().join("cache"));
        let e = entry("aa");
        blobs_for(src.path(), &e);

        assert_eq!(store.publish(&e, src.path()).await.unwrap(), PublishOutcome::Published);
        assert_eq!(store.publish(&e, src.path()).await.unwrap(), PublishOutcome::AlreadyPresent);

        let fetched = store.fetch(&e).await.unwrap().unwrap();
        for name in e.blob_names() {
            assert_eq!(std::fs::read_to_string(fetched.dir().join(name)).unwrap(), "aa");
        }

        // No temporaries left behind
        let leftovers: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|i| i.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn publish_with_missing_source_fails_cleanly() {
        let src = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let store = LocalCacheStore::new(dir.path());

        assert!(store.publish(&entry("aa"), src.path()).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn marker_does_not_cover_changed_roots() {
        let dir = TempDir::new().unwrap();
        let store = LocalCacheStore::new(dir.path());
        let before = entry("aa");
        store.mark_shared_current(&before).await.unwrap();

        let after = CacheEntry::new(
            Fingerprint::from_hex("aa"),
            Variant::Production,
            &DependencyRoots::new("node_modules", "vendor"),
        );
        assert_eq!(before.key(), after.key());
        assert!(store.is_shared_current(&before).await);
        assert!(!store.is_shared_current(&after).await);

        store.mark_shared_current(&after).await.unwrap();
        assert!(store.is_shared_current(&after).await);
    }

    #[tokio::test]
    async fn remove_one_removes_blobs_and_marker() {
        let dir = TempDir::new().unwrap();
        let store = LocalCacheStore::new(dir.path());
        let e = entry("aa");
        blobs_for(dir.path(), &e);
        store.mark_shared_current(&e).await.unwrap();

        let removed = store.remove_one(&e).await.unwrap();
        assert_eq!(removed, e.blob_names());
        assert!(!store.is_shared_current(&e).await);
        assert!(store.remove_one(&e).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_all_keeps_current_entry() {
        let dir = TempDir::new().unwrap();
        let store = LocalCacheStore::new(dir.path());
        let (fp0, fp1, fp2) = (entry("f0"), entry("f1"), entry("f2"));
        for e in [&fp0, &fp1, &fp2] {
            blobs_for(dir.path(), e);
            store.mark_shared_current(e).await.unwrap();
        }

        let removed = store.remove_all(Some(&fp0)).await.unwrap();

        assert_eq!(removed.len(), 4);
        assert!(store.exists(&fp0).await.unwrap());
        assert!(store.is_shared_current(&fp0).await);
        assert!(!store.exists(&fp1).await.unwrap());
        assert!(!store.exists(&fp2).await.unwrap());
        assert!(!store.is_shared_current(&fp1).await);
    }

    #[tokio::test]
    async fn remove_all_without_keep_empties_store() {
        let dir = TempDir::new().unwrap();
        let store = LocalCacheStore::new(dir.path());
        blobs_for(dir.path(), &entry("f0"));
        blobs_for(dir.path(), &entry("f1"));

        store.remove_all(None).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn forget_all_shared_spares_kept_marker() {
        let dir = TempDir::new().unwrap();
        let store = LocalCacheStore::new(dir.path());
        let (a, b) = (entry("f0"), entry("f1"));
        store.mark_shared_current(&a).await.unwrap();
        store.mark_shared_current(&b).await.unwrap();

        store.forget_all_shared(Some(&a)).await.unwrap();

        assert!(store.is_shared_current(&a).await);
        assert!(!store.is_shared_current(&b).await);
    }
}
