//! Postinstall hook execution

use crate::error::DepcacheError;
use crate::manifest::PostinstallHook;
use crate::process::Exec;
use tracing::{info, warn};

/// Run every hook in order, each through `sh -c` inside its package
/// directory. Failures are collected rather than aborting the remaining
/// hooks; the dependencies are already in place.
pub async fn run_postinstall(hooks: &[PostinstallHook], verbose: bool) -> Vec<DepcacheError> {
    let mut failures = Vec::new();

    for hook in hooks {
        if let Err(e) = run_one(hook, verbose).await {
            warn!("{}", e);
            failures.push(e);
        }
    }

    failures
}

async fn run_one(hook: &PostinstallHook, verbose: bool) -> Result<(), DepcacheError> {
    let failed = |reason: String| DepcacheError::Postinstall {
        path: hook.working_path.clone(),
        command: hook.command.clone(),
        reason,
    };

    if !hook.working_path.is_dir() {
        return Err(failed("package directory does not exist".to_string()));
    }

    info!("Postinstall in {}: {}", hook.working_path.display(), hook.command);
    let output = Exec::new("sh")
        .args(["-c", hook.command.as_str()])
        .current_dir(&hook.working_path)
        .verbose(verbose)
        .output()
        .await
        .map_err(|e| failed(e.to_string()))?;

    if output.success() {
        Ok(())
    } else {
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| format!("code {c}"));
        Err(failed(format!("exited with {code}: {}", output.stderr.trim())))
    }
}
