//! Install command - resolve dependencies through the cache tiers

use crate::cache::{CacheEntry, InvalidationService, InvalidationTarget, PublishOutcome, Tier};
use crate::cli::Project;
use crate::config::{BeforeLoadAction, BeforeLoadConfig};
use crate::error::{DepcacheError, DepcacheResult};
use crate::installer::CommandInstaller;
use crate::pipeline::{Resolution, ResolutionPipeline, RunScope};
use crate::ui::{self, TaskSpinner, UiContext};
use std::sync::Arc;
use tracing::warn;

/// Execute the install command
pub async fn execute(project: &Project, ctx: &UiContext) -> DepcacheResult<()> {
    // Pre-flight: everything that can be rejected is rejected before any work
    let manifest = project.manifest()?;
    let local = project.local_store()?;
    let installer = CommandInstaller::from_config(&project.config.installer, project.verbose)?;
    let entry = project.entry(&manifest);

    let scope = RunScope::new(&project.work_dir)?;
    let shared = project.shared_store(&scope.staging_root()?);
    let audit = project.audit();

    ui::intro(ctx, &format!("depcache install ({})", manifest.variant()));

    if let Some(before) = &project.config.before_load {
        let mut service = InvalidationService::new(local.clone()).with_audit(audit.clone());
        if let Some(shared) = &shared {
            service = service.with_shared(shared.clone());
        }
        if let Err(e) = before_load(&service, before, &entry, shared.is_some()).await {
            warn!("before_load invalidation failed: {}", e);
            ui::step_warn_hint(ctx, "Pre-load invalidation failed", &e.to_string());
        }
    }

    let roots = project.config.dependency_roots();
    let mut pipeline = ResolutionPipeline::new(local, Arc::new(installer), roots)
        .with_audit(audit)
        .verbose(project.verbose);
    if let Some(shared) = shared {
        pipeline = pipeline.with_shared(shared);
    }

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!("Resolving {}", entry));

    let outcome = tokio::select! {
        result = pipeline.resolve(&manifest, &scope) => result,
        _ = tokio::signal::ctrl_c() => Err(DepcacheError::Interrupted),
    };
    // Already done when the pipeline finished; needed when interrupted
    scope.cleanup().await;

    match outcome {
        Ok(resolution) => {
            spinner.stop(&format!("Dependencies loaded from {} tier", resolution.satisfied_from));
            report(ctx, &resolution);
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Dependencies could not be loaded");
            Err(e)
        }
    }
}

async fn before_load(
    service: &InvalidationService,
    before: &BeforeLoadConfig,
    entry: &CacheEntry,
    shared_available: bool,
) -> DepcacheResult<()> {
    // A run without the shared tier can still honor the local half
    let target = match (before.target, shared_available) {
        (InvalidationTarget::Both, false) => InvalidationTarget::Local,
        (InvalidationTarget::Shared, false) => return Ok(()),
        (target, _) => target,
    };

    let keep = match before.invalidate {
        BeforeLoadAction::All => None,
        BeforeLoadAction::AllExceptCurrent => Some(entry),
    };
    service.invalidate_all(target, keep).await?;
    Ok(())
}

fn report(ctx: &UiContext, resolution: &Resolution) {
    ui::key_value(ctx, "fingerprint", resolution.fingerprint.as_str());

    for publish in &resolution.publishes {
        let tier = tier_label(publish.tier);
        match &publish.result {
            Ok(PublishOutcome::Published) => {
                ui::step_ok_detail(ctx, &format!("Stored in {tier}"), &resolution.entry)
            }
            Ok(PublishOutcome::AlreadyPresent) => {
                ui::step_info(ctx, &format!("{tier} already up to date"))
            }
            Err(reason) => ui::step_warn_hint(ctx, &format!("Could not store in {tier}"), reason),
        }
    }

    for failure in &resolution.postinstall_failures {
        ui::step_warn(ctx, failure);
    }

    let published = resolution.publishes.iter().all(|p| p.result.is_ok());
    if resolution.postinstall_failures.is_empty() && published {
        ui::outro_success(ctx, "Dependencies ready");
    } else {
        ui::outro_warn(ctx, "Dependencies ready, with warnings");
    }
}

fn tier_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Local => "local cache",
        Tier::Shared => "shared cache",
        Tier::Installer => "installer",
    }
}
