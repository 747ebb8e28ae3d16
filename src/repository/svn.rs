//! Subversion repository client
//!
//! Shells out to the `svn` command line client. Every invocation is
//! non-interactive and bounded by the configured command timeout.

use crate::error::{DepcacheError, DepcacheResult};
use crate::process::Exec;
use crate::repository::RepositoryClient;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Error codes and messages svn uses when a commit loses a race
const CONFLICT_MARKERS: &[&str] = &[
    "E160020",
    "E160024",
    "E155011",
    "E170004",
    "already exists",
    "out of date",
];

/// Repository client backed by the `svn` executable
#[derive(Debug, Clone)]
pub struct SvnClient {
    url: String,
    command: String,
    timeout: Option<Duration>,
    verbose: bool,
}

impl SvnClient {
    pub fn new(
        url: impl Into<String>,
        command: impl Into<String>,
        timeout: Option<Duration>,
        verbose: bool,
    ) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            command: command.into(),
            timeout,
            verbose,
        }
    }

    fn svn(&self) -> Exec {
        Exec::new(&self.command)
            .arg("--non-interactive")
            .timeout(self.timeout)
            .verbose(self.verbose)
    }

    fn file_url(&self, name: &str) -> String {
        format!("{}/{}", self.url, name)
    }
}

/// Turn the stderr of a failed commit into a conflict when svn reports
/// that the target changed underneath it
fn classify(err: DepcacheError) -> DepcacheError {
    match err {
        DepcacheError::ExternalTool { command, stderr, .. } if is_conflict_message(&stderr) => {
            DepcacheError::RepositoryConflict { command, stderr }
        }
        other => other,
    }
}

fn is_conflict_message(stderr: &str) -> bool {
    CONFLICT_MARKERS.iter().any(|marker| stderr.contains(marker))
}

/// Plain file names from `svn list` output; directories end in `/`
fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with('/'))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl RepositoryClient for SvnClient {
    fn location(&self) -> &str {
        &self.url
    }

    async fn checkout_metadata(&self, wc: &Path) -> DepcacheResult<()> {
        debug!("Checking out {} (metadata only) into {}", self.url, wc.display());
        self.svn()
            .args(["checkout", "--depth", "empty", self.url.as_str(), "."])
            .current_dir(wc)
            .checked()
            .await?;
        Ok(())
    }

    async fn list(&self, wc: &Path) -> DepcacheResult<Vec<String>> {
        let output = self
            .svn()
            .args(["list", "-r", "HEAD"])
            .current_dir(wc)
            .checked()
            .await?;
        Ok(parse_listing(&output.stdout))
    }

    async fn update(&self, wc: &Path, names: &[String]) -> DepcacheResult<()> {
        self.svn()
            .arg("update")
            .args(names.iter().cloned())
            .current_dir(wc)
            .checked()
            .await?;
        Ok(())
    }

    async fn add(&self, wc: &Path, names: &[String]) -> DepcacheResult<()> {
        self.svn()
            .arg("add")
            .args(names.iter().cloned())
            .current_dir(wc)
            .checked()
            .await?;
        Ok(())
    }

    async fn commit(&self, wc: &Path, message: &str) -> DepcacheResult<()> {
        self.svn()
            .args(["commit", "-m", message])
            .current_dir(wc)
            .checked()
            .await
            .map_err(classify)?;
        info!("Committed to {}: {}", self.url, message);
        Ok(())
    }

    async fn remove(&self, names: &[String], message: &str) -> DepcacheResult<()> {
        self.svn()
            .args(["delete", "-m", message])
            .args(names.iter().map(|name| self.file_url(name)))
            .checked()
            .await
            .map_err(classify)?;
        info!("Removed {} file(s) from {}", names.len(), self.url);
        Ok(())
    }
}
