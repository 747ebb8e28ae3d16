//! External command execution
//!
//! Every tool depcache drives (installers, the repository client, hooks)
//! goes through [`Exec`]: output is captured, stdin is closed, and the child
//! is killed if the command outlives its timeout or the caller goes away.
//!
//! On Unix each command leads its own process group, and the whole group is
//! killed, so helpers forked by npm, bower or `sh -c` die with it.

use crate::error::{DepcacheError, DepcacheResult};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Captured result of a finished command
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// A command to run with captured output
#[derive(Debug, Clone)]
pub struct Exec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
    verbose: bool,
}

impl Exec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
            verbose: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Kill the command once `timeout` elapses
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Surface captured output at info level instead of debug
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Human readable command line for logs and errors
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion. A non-zero exit is returned, not treated as an error.
    pub async fn output(&self) -> DepcacheResult<CommandOutput> {
        let command_line = self.display();
        debug!("Executing: {}", command_line);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let child = cmd
            .spawn()
            .map_err(|e| DepcacheError::command_failed(command_line.clone(), e))?;
        // Declared before the wait so it outlives the child on every exit path
        let mut group = GroupKill::new(child.id());

        let waited = match self.timeout {
            // Dropping the timed-out future drops the child, which kills it
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| DepcacheError::Timeout {
                    command: command_line.clone(),
                    timeout: limit,
                })?,
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|e| DepcacheError::command_failed(command_line.clone(), e))?;
        group.disarm();

        let result = CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        self.trace_output(&result);
        Ok(result)
    }

    /// Run to completion, turning a non-zero exit into an external tool error
    pub async fn checked(&self) -> DepcacheResult<CommandOutput> {
        let output = self.output().await?;
        if output.success() {
            Ok(output)
        } else {
            Err(DepcacheError::external_tool(
                self.display(),
                output.status.code(),
                output.stderr.trim(),
            ))
        }
    }

    fn trace_output(&self, output: &CommandOutput) {
        for line in output.stdout.lines().chain(output.stderr.lines()) {
            if line.trim().is_empty() {
                continue;
            }
            if self.verbose {
                info!("[{}] {}", self.program, line);
            } else {
                debug!("[{}] {}", self.program, line);
            }
        }
    }
}

/// Kills a child's process group on drop unless the child exited normally
struct GroupKill {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
}

impl GroupKill {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.and_then(|id| libc::pid_t::try_from(id).ok()) {
            // SAFETY: killpg only sends a signal; a group that is already gone yields ESRCH
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc == 0 {
                debug!("Killed process group {}", pgid);
            }
        }
    }
}
