//! Invalidate commands - remove cache entries from the local and shared tiers

use crate::cache::{InvalidationReport, InvalidationService};
use crate::cli::args::InvalidateArgs;
use crate::cli::Project;
use crate::error::DepcacheResult;
use crate::pipeline::RunScope;
use crate::ui::{self, UiContext};

/// Which entries to remove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateMode {
    /// The entry of the current manifest
    Exact,
    /// Everything
    All,
    /// Everything but the entry of the current manifest
    AllExceptCurrent,
}

/// Execute one of the invalidate commands
pub async fn execute(
    project: &Project,
    ctx: &UiContext,
    mode: InvalidateMode,
    args: InvalidateArgs,
) -> DepcacheResult<()> {
    let target = args.target.unwrap_or_else(|| project.default_target());
    let local = project.local_store()?;
    let current = match mode {
        InvalidateMode::All => None,
        InvalidateMode::Exact | InvalidateMode::AllExceptCurrent => {
            let manifest = project.manifest()?;
            Some(project.entry(&manifest))
        }
    };

    let scope = RunScope::new(&project.work_dir)?;
    let mut service = InvalidationService::new(local).with_audit(project.audit());
    if let Some(shared) = project.shared_store(&scope.staging_root()?) {
        service = service.with_shared(shared);
    }

    let result = match (mode, &current) {
        (InvalidateMode::Exact, Some(entry)) => service.invalidate_exact(entry, target).await,
        (InvalidateMode::AllExceptCurrent, keep) => {
            service.invalidate_all(target, keep.as_ref()).await
        }
        (_, _) => service.invalidate_all(target, None).await,
    };
    scope.cleanup().await;

    report(ctx, &result?);
    Ok(())
}

fn report(ctx: &UiContext, reports: &[InvalidationReport]) {
    for report in reports {
        if report.removed.is_empty() {
            ui::step_info(ctx, &format!("{} cache: nothing to remove", report.tier));
            continue;
        }

        let summary = format!("{} cache: removed {} file(s)", report.tier, report.removed.len());
        ui::step_ok(ctx, &summary);
        for name in &report.removed {
            ui::remark(ctx, name);
        }
    }
}
