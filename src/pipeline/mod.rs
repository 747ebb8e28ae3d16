//! Tiered dependency resolution
//!
//! One run walks a fixed sequence of stages:
//!
//! ```text
//! TryLocal -> TryShared -> Install -> Publish -> Postinstall -> Done
//! ```
//!
//! A hit in any tier skips the tiers after it. Tier failures fall through to
//! the next tier; only an installer failure is fatal. Entries obtained from
//! one tier are written through to the cache tiers that lacked them, and
//! publishing is best effort. Whatever happens, the run scope is cleaned up
//! before [`ResolutionPipeline::resolve`] returns.

pub mod hooks;
pub mod scope;

pub use scope::RunScope;

use crate::audit::{AuditLog, EVENT_PUBLISHED};
use crate::cache::{
    fingerprint, ArtifactArchiver, CacheEntry, CacheTier, FetchedEntry, Fingerprint,
    LocalCacheStore, PublishOutcome, Tier,
};
use crate::error::{DepcacheError, DepcacheResult};
use crate::installer::PackageInstaller;
use crate::manifest::ecosystem::write_installer_manifests;
use crate::manifest::{DependencyManifest, DependencyRoots};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one publish attempt
#[derive(Debug)]
pub struct PublishReport {
    pub tier: Tier,
    pub result: Result<PublishOutcome, String>,
}

/// What a successful run did
#[derive(Debug)]
pub struct Resolution {
    pub fingerprint: Fingerprint,
    pub entry: String,
    pub satisfied_from: Tier,
    pub publishes: Vec<PublishReport>,
    pub postinstall_failures: Vec<String>,
}

enum Stage {
    TryLocal,
    TryShared,
    Install,
    Publish { blobs: FetchedEntry, targets: Vec<Tier> },
    Postinstall,
    Done,
}

/// Resolves a manifest through the cache tiers and the installer
pub struct ResolutionPipeline {
    local: LocalCacheStore,
    shared: Option<Arc<dyn CacheTier>>,
    installer: Arc<dyn PackageInstaller>,
    roots: DependencyRoots,
    audit: AuditLog,
    verbose: bool,
}

impl ResolutionPipeline {
    pub fn new(
        local: LocalCacheStore,
        installer: Arc<dyn PackageInstaller>,
        roots: DependencyRoots,
    ) -> Self {
        Self {
            local,
            shared: None,
            installer,
            roots,
            audit: AuditLog::disabled(),
            verbose: false,
        }
    }

    /// Enable the shared tier
    pub fn with_shared(mut self, shared: Arc<dyn CacheTier>) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Materialize the dependency roots of `manifest` in the scope's working
    /// directory. The scope is cleaned up on every outcome.
    pub async fn resolve(
        &self,
        manifest: &DependencyManifest,
        scope: &RunScope,
    ) -> DepcacheResult<Resolution> {
        let result = self.drive(manifest, scope).await;
        scope.cleanup().await;
        result
    }

    async fn drive(
        &self,
        manifest: &DependencyManifest,
        scope: &RunScope,
    ) -> DepcacheResult<Resolution> {
        let fingerprint = fingerprint(manifest);
        let entry = CacheEntry::new(fingerprint.clone(), manifest.variant(), &self.roots);
        let archiver = ArtifactArchiver::new(scope.staging_root()?);
        info!("Resolving {} dependencies ({})", manifest.variant(), entry);

        let mut satisfied_from = Tier::Installer;
        let mut shared_current = false;
        let mut publishes = Vec::new();
        let mut postinstall_failures = Vec::new();

        let mut stage = Stage::TryLocal;
        loop {
            stage = match stage {
                Stage::TryLocal => match self.try_local(&entry, &archiver, scope).await {
                    Some(blobs) => {
                        satisfied_from = Tier::Local;
                        let write_through = self.shared.is_some()
                            && !self.local.is_shared_current(&entry).await;
                        let targets = if write_through { vec![Tier::Shared] } else { Vec::new() };
                        Stage::Publish { blobs, targets }
                    }
                    None => Stage::TryShared,
                },

                Stage::TryShared => match self.try_shared(&entry, &archiver, scope).await {
                    Some(blobs) => {
                        satisfied_from = Tier::Shared;
                        shared_current = true;
                        Stage::Publish {
                            blobs,
                            targets: vec![Tier::Local],
                        }
                    }
                    None => Stage::Install,
                },

                Stage::Install => {
                    self.install(manifest, scope).await?;

                    let blob_dir = scope.staging_dir("blobs-")?;
                    let mut targets = vec![Tier::Local];
                    if self.shared.is_some() {
                        targets.push(Tier::Shared);
                    }

                    match archiver.pack(&entry, scope.work_dir(), blob_dir.path()).await {
                        Ok(()) => Stage::Publish {
                            blobs: FetchedEntry::staged(blob_dir),
                            targets,
                        },
                        Err(e) => {
                            warn!("Could not archive installed dependencies: {}", e);
                            publishes.extend(targets.into_iter().map(|tier| PublishReport {
                                tier,
                                result: Err(e.to_string()),
                            }));
                            Stage::Postinstall
                        }
                    }
                }

                Stage::Publish { blobs, targets } => {
                    for tier in targets {
                        let result = self.publish(tier, &entry, &blobs).await;
                        if tier == Tier::Shared && result.is_ok() {
                            shared_current = true;
                        }
                        publishes.push(PublishReport {
                            tier,
                            result: result.map_err(|e| e.to_string()),
                        });
                    }

                    if shared_current {
                        if let Err(e) = self.local.mark_shared_current(&entry).await {
                            warn!("Could not record shared state of {}: {}", entry, e);
                        }
                    }
                    Stage::Postinstall
                }

                Stage::Postinstall => {
                    let hooks = manifest.postinstall_hooks(scope.work_dir(), &self.roots);
                    postinstall_failures = hooks::run_postinstall(&hooks, self.verbose)
                        .await
                        .into_iter()
                        .map(|e| e.to_string())
                        .collect();
                    Stage::Done
                }

                Stage::Done => {
                    info!("Dependencies for {} satisfied from {} tier", entry, satisfied_from);
                    return Ok(Resolution {
                        fingerprint,
                        entry: entry.key(),
                        satisfied_from,
                        publishes,
                        postinstall_failures,
                    });
                }
            };
        }
    }

    async fn try_local(
        &self,
        entry: &CacheEntry,
        archiver: &ArtifactArchiver,
        scope: &RunScope,
    ) -> Option<FetchedEntry> {
        let blobs = match self.local.fetch(entry).await {
            Ok(Some(blobs)) => blobs,
            Ok(None) => {
                info!("{} not in local cache", entry);
                return None;
            }
            Err(e) => {
                warn!("Local cache unavailable: {}", e);
                return None;
            }
        };

        match archiver.unpack(entry, blobs.dir(), scope.work_dir()).await {
            Ok(()) => {
                info!("Loaded {} from local cache", entry);
                Some(blobs)
            }
            Err(e) => {
                warn!("Local entry {} could not be extracted: {}", entry, e);
                // Drop it so the fresh install can take its place
                if let Err(e) = self.local.remove_one(entry).await {
                    warn!("Could not remove broken local entry {}: {}", entry, e);
                }
                None
            }
        }
    }

    async fn try_shared(
        &self,
        entry: &CacheEntry,
        archiver: &ArtifactArchiver,
        scope: &RunScope,
    ) -> Option<FetchedEntry> {
        let shared = self.shared.as_ref()?;

        let blobs = match shared.fetch(entry).await {
            Ok(Some(blobs)) => blobs,
            Ok(None) => {
                info!("{} not in shared cache", entry);
                return None;
            }
            Err(e) => {
                warn!("Shared cache unavailable: {}", e);
                return None;
            }
        };

        match archiver.unpack(entry, blobs.dir(), scope.work_dir()).await {
            Ok(()) => {
                info!("Loaded {} from shared cache", entry);
                Some(blobs)
            }
            Err(e) => {
                warn!("Shared entry {} could not be extracted: {}", entry, e);
                None
            }
        }
    }

    async fn install(&self, manifest: &DependencyManifest, scope: &RunScope) -> DepcacheResult<()> {
        write_installer_manifests(manifest, &self.roots, scope).await?;

        info!("Installing dependencies from scratch");
        match self.installer.install(scope.work_dir()).await {
            Ok(()) => Ok(()),
            Err(e @ DepcacheError::Timeout { .. }) => Err(e),
            Err(e) => Err(DepcacheError::DependenciesLoading(e.to_string())),
        }
    }

    async fn publish(
        &self,
        tier: Tier,
        entry: &CacheEntry,
        blobs: &FetchedEntry,
    ) -> DepcacheResult<PublishOutcome> {
        let result = match tier {
            Tier::Local => self.local.publish(entry, blobs.dir()).await,
            Tier::Shared => match &self.shared {
                Some(shared) => shared.publish(entry, blobs.dir()).await,
                None => return Err(DepcacheError::MissingStorage("storage.shared")),
            },
            Tier::Installer => {
                return Err(DepcacheError::Internal(
                    "installer tier cannot be published to".to_string(),
                ))
            }
        };

        match result {
            Ok(outcome) => {
                debug!("Publish of {} to {} tier: {:?}", entry, tier, outcome);
                if tier == Tier::Shared && outcome == PublishOutcome::Published {
                    self.audit
                        .log(
                            EVENT_PUBLISHED,
                            serde_json::json!({
                                "entry": entry.key(),
                                "variant": entry.variant().to_string(),
                                "blobs": entry.blob_names(),
                            }),
                        )
                        .await;
                }
                Ok(outcome)
            }
            Err(e) => {
                let err = DepcacheError::Publish {
                    tier,
                    reason: e.to_string(),
                };
                warn!("{}", err);
                Err(err)
            }
        }
    }
}
