//! Cache invalidation
//!
//! Removes entries from the local and shared tiers, either one exact entry
//! or everything (optionally sparing the current entry). Shared removals are
//! computed from the repository's actual contents and committed with an
//! audit message.

use crate::audit::{AuditLog, EVENT_INVALIDATED};
use crate::cache::{CacheEntry, CacheTier, LocalCacheStore, Tier};
use crate::error::{DepcacheError, DepcacheResult};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Which tiers an invalidation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationTarget {
    Local,
    Shared,
    Both,
}

impl InvalidationTarget {
    fn tiers(self) -> &'static [Tier] {
        match self {
            Self::Local => &[Tier::Local],
            Self::Shared => &[Tier::Shared],
            Self::Both => &[Tier::Local, Tier::Shared],
        }
    }
}

impl fmt::Display for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Shared => write!(f, "shared"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Blobs removed from one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub tier: Tier,
    pub removed: Vec<String>,
}

/// Request shape shared by the exact and bulk operations
enum Scope<'a> {
    Exact(&'a CacheEntry),
    All { keep: Option<&'a CacheEntry> },
}

pub struct InvalidationService {
    local: LocalCacheStore,
    shared: Option<Arc<dyn CacheTier>>,
    audit: AuditLog,
}

impl InvalidationService {
    pub fn new(local: LocalCacheStore) -> Self {
        Self {
            local,
            shared: None,
            audit: AuditLog::disabled(),
        }
    }

    pub fn with_shared(mut self, shared: Arc<dyn CacheTier>) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// Remove exactly `entry` from the targeted tiers. Absent entries are a
    /// no-op.
    pub async fn invalidate_exact(
        &self,
        entry: &CacheEntry,
        target: InvalidationTarget,
    ) -> DepcacheResult<Vec<InvalidationReport>> {
        self.run(Scope::Exact(entry), target).await
    }

    /// Remove every entry from the targeted tiers except `keep`
    pub async fn invalidate_all(
        &self,
        target: InvalidationTarget,
        keep: Option<&CacheEntry>,
    ) -> DepcacheResult<Vec<InvalidationReport>> {
        self.run(Scope::All { keep }, target).await
    }

    /// Attempt every targeted tier, then fail with the first error if any
    async fn run(
        &self,
        scope: Scope<'_>,
        target: InvalidationTarget,
    ) -> DepcacheResult<Vec<InvalidationReport>> {
        let shared = match (target, &self.shared) {
            (InvalidationTarget::Local, _) => None,
            (_, Some(shared)) => Some(shared),
            (_, None) => return Err(DepcacheError::MissingStorage("storage.shared")),
        };

        let mut reports = Vec::new();
        let mut first_error = None;

        for tier in target.tiers() {
            let result = match tier {
                Tier::Local => self.invalidate_local(&scope).await,
                Tier::Shared => match shared {
                    Some(shared) => self.invalidate_shared(shared.as_ref(), &scope).await,
                    None => continue,
                },
                Tier::Installer => continue,
            };

            match result {
                Ok(removed) => {
                    info!("Invalidated {} blob(s) in {} cache", removed.len(), tier);
                    reports.push(InvalidationReport { tier: *tier, removed });
                }
                Err(e) => {
                    error!("Invalidation of {} cache failed: {}", tier, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    async fn invalidate_local(&self, scope: &Scope<'_>) -> DepcacheResult<Vec<String>> {
        match scope {
            Scope::Exact(entry) => self.local.remove_one(entry).await,
            Scope::All { keep } => self.local.remove_all(*keep).await,
        }
    }

    async fn invalidate_shared(
        &self,
        shared: &dyn CacheTier,
        scope: &Scope<'_>,
    ) -> DepcacheResult<Vec<String>> {
        let removed = match scope {
            Scope::Exact(entry) => {
                if !shared.exists(entry).await? {
                    info!("{} not in shared cache, nothing to invalidate", entry);
                    self.local.forget_shared(entry).await?;
                    return Ok(Vec::new());
                }
                let removed = shared.remove_one(entry).await?;
                self.local.forget_shared(entry).await?;
                removed
            }
            Scope::All { keep } => {
                let removed = shared.remove_all(*keep).await?;
                self.local.forget_all_shared(*keep).await?;
                removed
            }
        };

        if !removed.is_empty() {
            self.audit
                .log(
                    EVENT_INVALIDATED,
                    serde_json::json!({
                        "tier": Tier::Shared,
                        "removed": removed,
                        "kept": match scope {
                            Scope::All { keep: Some(entry) } => Some(entry.key()),
                            _ => None,
                        },
                    }),
                )
                .await;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Fingerprint, SharedCacheStore};
    use crate::manifest::{DependencyRoots, Variant};
    use crate::testing::MemoryRepository;
    use std::collections::BTreeSet;
    use std::path::Path;
    use tempfile::TempDir;

    fn entry(fp: &str) -> CacheEntry {
        CacheEntry::new(Fingerprint::from_hex(fp), Variant::Production, &DependencyRoots::default())
    }

    fn seed_local(dir: &Path, entry: &CacheEntry) {
        for name in entry.blob_names() {
            std::fs::write(dir.join(name), "blob").unwrap();
        }
    }

    struct Fixture {
        local_dir: TempDir,
        staging: TempDir,
        repo: Arc<MemoryRepository>,
    }

    impl Fixture {
        fn new(entries: &[&CacheEntry]) -> Self {
            let fixture = Self {
                local_dir: TempDir::new().unwrap(),
                staging: TempDir::new().unwrap(),
                repo: Arc::new(MemoryRepository::new()),
            };
            for e in entries {
                seed_local(fixture.local_dir.path(), e);
                fixture.repo.seed_entry(e);
            }
            fixture
        }

        fn local(&self) -> LocalCacheStore {
            LocalCacheStore::new(self.local_dir.path())
        }

        fn service(&self) -> InvalidationService {
            InvalidationService::new(self.local()).with_shared(Arc::new(SharedCacheStore::new(
                self.repo.clone(),
                self.staging.path(),
            )))
        }
    }

    #[tokio::test]
    async fn all_except_current_local_only() {
        let (fp0, fp1, fp2) = (entry("f0"), entry("f1"), entry("f2"));
        let fx = Fixture::new(&[&fp0, &fp1, &fp2]);

        let reports = fx
            .service()
            .invalidate_all(InvalidationTarget::Local, Some(&fp0))
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].tier, Tier::Local);
        assert_eq!(reports[0].removed.len(), 4);
        assert!(fx.local().exists(&fp0).await.unwrap());
        assert!(!fx.local().exists(&fp1).await.unwrap());
        assert!(!fx.local().exists(&fp2).await.unwrap());
        // Shared untouched
        assert_eq!(fx.repo.names().len(), 6);
        assert_eq!(fx.repo.checkouts(), 0);
    }

    #[tokio::test]
    async fn all_both_tiers() {
        let (fp0, fp1) = (entry("f0"), entry("f1"));
        let fx = Fixture::new(&[&fp0, &fp1]);

        let reports = fx
            .service()
            .invalidate_all(InvalidationTarget::Both, None)
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(fx.repo.names().is_empty());
        assert!(!fx.local().exists(&fp0).await.unwrap());
        assert_eq!(fx.repo.removes(), 1);
    }

    #[tokio::test]
    async fn exact_shared_absent_is_noop() {
        let fx = Fixture::new(&[&entry("f1")]);

        let reports = fx
            .service()
            .invalidate_exact(&entry("f0"), InvalidationTarget::Shared)
            .await
            .unwrap();

        assert!(reports[0].removed.is_empty());
        assert_eq!(fx.repo.removes(), 0);
    }

    #[tokio::test]
    async fn exact_shared_clears_marker_but_keeps_local_blobs() {
        let fp0 = entry("f0");
        let fx = Fixture::new(&[&fp0]);
        fx.local().mark_shared_current(&fp0).await.unwrap();

        fx.service()
            .invalidate_exact(&fp0, InvalidationTarget::Shared)
            .await
            .unwrap();

        assert!(fx.repo.names().is_empty());
        assert!(fx.local().exists(&fp0).await.unwrap());
        assert!(!fx.local().is_shared_current(&fp0).await);
        assert!(fx.repo.last_message().unwrap().contains("remove cache entry"));
    }

    #[tokio::test]
    async fn concurrent_removal_is_not_an_error() {
        let (fp0, fp1) = (entry("f0"), entry("f1"));
        let fx = Fixture::new(&[&fp0, &fp1]);
        fx.repo.race_before_remove(&fp1);

        let reports = fx
            .service()
            .invalidate_all(InvalidationTarget::Shared, Some(&fp0))
            .await
            .unwrap();

        assert!(reports[0].removed.is_empty());
        assert_eq!(fx.repo.names(), fp0.blob_names().into_iter().collect::<BTreeSet<_>>());
    }

    #[tokio::test]
    async fn both_attempts_local_even_when_shared_fails() {
        let fp0 = entry("f0");
        let fx = Fixture::new(&[&fp0]);
        fx.repo.set_unreachable(true);

        let err = fx
            .service()
            .invalidate_exact(&fp0, InvalidationTarget::Both)
            .await
            .unwrap_err();

        assert!(matches!(err, DepcacheError::ExternalTool { .. }));
        assert!(!fx.local().exists(&fp0).await.unwrap());
    }

    #[tokio::test]
    async fn shared_target_without_shared_storage_is_config_error() {
        let local_dir = TempDir::new().unwrap();
        let service = InvalidationService::new(LocalCacheStore::new(local_dir.path()));

        let err = service
            .invalidate_all(InvalidationTarget::Both, None)
            .await
            .unwrap_err();
        assert!(err.is_config());

        assert!(service
            .invalidate_all(InvalidationTarget::Local, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn shared_invalidation_is_audited() {
        let fp0 = entry("f0");
        let fx = Fixture::new(&[&fp0]);
        let audit_dir = TempDir::new().unwrap();
        let service = fx
            .service()
            .with_audit(AuditLog::at(audit_dir.path().join("audit.log"), true));

        service
            .invalidate_all(InvalidationTarget::Shared, None)
            .await
            .unwrap();

        let log = std::fs::read_to_string(audit_dir.path().join("audit.log")).unwrap();
        assert!(log.contains(EVENT_INVALIDATED));
        assert!(log.contains(&fp0.blob_names()[0]));
    }
}
