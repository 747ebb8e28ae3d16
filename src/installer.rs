//! Package installer adapter
//!
//! The installer is the authoritative tier: it reads the generated
//! ecosystem manifests from the working directory and materializes the
//! dependency roots. depcache treats it as a black box.

use crate::config::schema::InstallerConfig;
use crate::error::{DepcacheError, DepcacheResult};
use crate::process::Exec;
use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Something that can populate the dependency roots from scratch
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Install into `work_dir`. Must fail on a non-zero exit.
    async fn install(&self, work_dir: &Path) -> DepcacheResult<()>;
}

/// Runs the configured installer commands in sequence under one deadline
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    commands: Vec<Vec<String>>,
    timeout: Duration,
    verbose: bool,
}

impl CommandInstaller {
    pub fn new(
        commands: Vec<Vec<String>>,
        timeout: Duration,
        verbose: bool,
    ) -> DepcacheResult<Self> {
        if commands.is_empty() || commands.iter().any(|argv| argv.is_empty()) {
            return Err(DepcacheError::User(
                "installer.commands must list at least one non-empty command".to_string(),
            ));
        }

        Ok(Self {
            commands,
            timeout,
            verbose,
        })
    }

    pub fn from_config(config: &InstallerConfig, verbose: bool) -> DepcacheResult<Self> {
        Self::new(config.commands.clone(), config.timeout(), verbose)
    }
}

#[async_trait]
impl PackageInstaller for CommandInstaller {
    async fn install(&self, work_dir: &Path) -> DepcacheResult<()> {
        // A timeout past the clock's range means no deadline at all
        let deadline = Instant::now().checked_add(self.timeout);

        for argv in &self.commands {
            let Some((program, args)) = argv.split_first() else {
                continue;
            };
            let exec = Exec::new(program)
                .args(args.iter().cloned())
                .current_dir(work_dir)
                .verbose(self.verbose);
            let command_line = exec.display();

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining.is_some_and(|r| r.is_zero()) {
                return Err(DepcacheError::Timeout {
                    command: command_line,
                    timeout: self.timeout,
                });
            }

            info!("Running installer: {}", command_line);
            let output = exec.timeout(remaining).output().await.map_err(|e| match e {
                DepcacheError::Timeout { command, .. } => DepcacheError::Timeout {
                    command,
                    timeout: self.timeout,
                },
                other => other,
            })?;

            if !output.success() {
                for line in output.stderr.lines().filter(|l| l.contains("ERR!")) {
                    warn!("{}", line);
                }
                return Err(DepcacheError::external_tool(
                    command_line,
                    output.status.code(),
                    output.stderr.trim(),
                ));
            }
        }

        Ok(())
    }
}
