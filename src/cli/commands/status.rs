//! Status command - show where the current manifest is cached

use crate::cache::CacheTier;
use crate::cli::Project;
use crate::error::DepcacheResult;
use crate::pipeline::RunScope;
use crate::ui::{self, UiContext};

/// Execute the status command
pub async fn execute(project: &Project, ctx: &UiContext) -> DepcacheResult<()> {
    let manifest = project.manifest()?;
    let entry = project.entry(&manifest);
    let local = project.local_store()?;

    ui::intro(ctx, "depcache status");
    ui::key_value(ctx, "config", &project.manager.path().display().to_string());
    ui::key_value(ctx, "variant", &manifest.variant().to_string());
    ui::key_value(ctx, "fingerprint", entry.fingerprint().as_str());
    ui::key_value(ctx, "dependencies", &manifest.dependencies().len().to_string());

    let in_local = local.exists(&entry).await?;
    ui::key_value_status(
        ctx,
        "local",
        &format!(
            "{} ({})",
            if in_local { "cached" } else { "missing" },
            local.dir().display()
        ),
        in_local,
    );

    let scope = RunScope::new(&project.work_dir)?;
    match project.shared_store(&scope.staging_root()?) {
        Some(shared) => match shared.exists(&entry).await {
            Ok(in_shared) => ui::key_value_status(
                ctx,
                "shared",
                &format!(
                    "{} ({})",
                    if in_shared { "cached" } else { "missing" },
                    shared.location()
                ),
                in_shared,
            ),
            Err(e) => ui::step_warn_hint(ctx, "Shared cache unavailable", &e.to_string()),
        },
        None => ui::key_value(ctx, "shared", "disabled"),
    }
    scope.cleanup().await;

    if local.is_shared_current(&entry).await {
        ui::remark(ctx, "Local entry is known to be present in the shared cache");
    }
    Ok(())
}
