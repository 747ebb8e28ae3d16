//! CLI argument definitions using clap derive

use crate::cache::InvalidationTarget;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// depcache - tiered dependency cache for build agents
///
/// Restores node_modules and vcs dependency roots from a local cache, a
/// shared repository cache, or a fresh install, and keeps the caches warm.
#[derive(Parser, Debug)]
#[command(name = "depcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DEPCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use the development variant (adds dev_dependencies)
    #[arg(long, global = true)]
    pub dev: bool,

    /// Do not read from or write to the shared cache
    #[arg(long, global = true)]
    pub no_shared: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore or install the project's dependencies
    Install,

    /// Remove the cache entry of the current manifest
    InvalidateExact(InvalidateArgs),

    /// Remove every cache entry
    InvalidateAll(InvalidateArgs),

    /// Remove every cache entry except the one of the current manifest
    InvalidateAllExceptCurrent(InvalidateArgs),

    /// Print the fingerprint of the current manifest
    Fingerprint(FingerprintArgs),

    /// Show which cache tiers hold the current manifest
    Status,

    /// Create a depcache.toml template
    Init(InitArgs),
}

/// Arguments for the invalidate commands
#[derive(Parser, Debug, Default)]
pub struct InvalidateArgs {
    /// Tiers to invalidate [default: both, or local when no shared cache is in use]
    #[arg(short, long, value_enum)]
    pub target: Option<InvalidationTarget>,
}

/// Arguments for the fingerprint command
#[derive(Parser, Debug, Default)]
pub struct FingerprintArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing depcache.toml
    #[arg(short, long)]
    pub force: bool,

    /// Directory to create depcache.toml in (defaults to current directory)
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}
