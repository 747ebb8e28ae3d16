//! Error types for depcache
//!
//! All modules use `DepcacheResult<T>` as their return type. Tier-level
//! failures (archive, external tool, publish) are recoverable by the
//! resolution pipeline; configuration errors are fatal before any work starts.

use crate::cache::Tier;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for depcache operations
pub type DepcacheResult<T> = Result<T, DepcacheError>;

/// All errors that can occur in depcache
#[derive(Error, Debug)]
pub enum DepcacheError {
    // Configuration errors
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Storage not configured: {0}")]
    MissingStorage(&'static str),

    #[error("No dependencies declared for the {variant} variant")]
    EmptyManifest { variant: String },

    #[error("Dependency declared more than once: {0}")]
    DuplicateDependency(String),

    #[error("Invalid dependency {name}: {reason}")]
    InvalidDependency { name: String, reason: String },

    #[error("Invalid dependency root {}: {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("Refusing to overwrite existing file {0}")]
    GeneratedFileExists(PathBuf),

    // External tool errors
    #[error("Command failed to start: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` exited with {}: {stderr}", exit_label(*code))]
    ExternalTool {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Repository rejected commit as conflicting: {command}: {stderr}")]
    RepositoryConflict { command: String, stderr: String },

    #[error("Command `{command}` timed out after {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    // Cache errors
    #[error("Archive error: {context}")]
    Archive {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Publish to {tier} cache failed: {reason}")]
    Publish { tier: Tier, reason: String },

    #[error("Postinstall `{command}` failed in {path}: {reason}")]
    Postinstall {
        path: PathBuf,
        command: String,
        reason: String,
    },

    #[error("Dependencies could not be loaded: {0}")]
    DependenciesLoading(String),

    #[error("Interrupted")]
    Interrupted,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| format!("code {c}"))
}

impl DepcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an archive error with context
    pub fn archive(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Archive {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an external tool error from an exit code and captured stderr
    pub fn external_tool(
        command: impl Into<String>,
        code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ExternalTool {
            command: command.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Whether the error is a repository commit conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::RepositoryConflict { .. })
    }

    /// Whether the error originated in configuration pre-flight
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_)
                | Self::ConfigInvalid { .. }
                | Self::MissingStorage(_)
                | Self::EmptyManifest { .. }
                | Self::DuplicateDependency(_)
                | Self::InvalidDependency { .. }
                | Self::InvalidRoot { .. }
                | Self::GeneratedFileExists(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound(_) => Some("Run: depcache init"),
            Self::MissingStorage(_) => Some("Add the key under [storage] in depcache.toml"),
            Self::InvalidRoot { .. } => {
                Some("Use distinct relative paths below the project in [roots]")
            }
            Self::GeneratedFileExists(_) => {
                Some("depcache writes installer manifests itself; remove the file or run elsewhere")
            }
            Self::Timeout { .. } => Some("Raise installer.timeout_secs in depcache.toml"),
            Self::ExternalTool { .. } | Self::DependenciesLoading(_) => {
                Some("Re-run with -vv to see the underlying command output")
            }
            _ => None,
        }
    }
}
