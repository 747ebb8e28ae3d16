//! Audit trail of shared cache mutations
//!
//! Writes JSON lines to `<state dir>/depcache/audit.log`. Every line carries
//! the id of the run that produced it, so the publishes and invalidations of
//! one build can be correlated across agents.

use crate::config::{Config, ConfigManager};
use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

/// Shared entry written by this run
pub const EVENT_PUBLISHED: &str = "cache.published";
/// Entries removed by an invalidation
pub const EVENT_INVALIDATED: &str = "cache.invalidated";

/// Append-only JSON lines logger
#[derive(Debug, Clone)]
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
    run_id: String,
}

impl AuditLog {
    /// Logger at the default location, honoring `general.audit_log`
    pub fn new(config: &Config) -> Self {
        Self::at(ConfigManager::audit_log_path(), config.general.audit_log)
    }

    /// Logger writing to `path`
    pub fn at(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            enabled,
            path: path.into(),
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Logger that records nothing
    pub fn disabled() -> Self {
        Self::at(PathBuf::new(), false)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record `event`. Write failures are logged and otherwise ignored.
    pub async fn log(&self, event: &str, data: Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "run": self.run_id,
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write audit log {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
