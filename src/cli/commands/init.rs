//! Init command - create a depcache.toml template

use crate::cli::args::InitArgs;
use crate::config::CONFIG_FILE_NAME;
use crate::error::{DepcacheError, DepcacheResult};
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;

/// Template for a new project config
const INIT_TEMPLATE: &str = r#"# depcache project configuration

[storage]
# Local cache directory, relative to this file
local = ".depcache/store"
# Shared repository URL; leave unset to use the local cache only
# shared = "svn://svn.example.com/depcache"

[shared]
# command = "svn"
# command_timeout_secs = 300

[installer]
# commands = [["npm", "install"], ["bower", "install"]]
# timeout_secs = 900

[roots]
# registry = "node_modules"
# vcs = "libs"

[general]
# audit_log = true

# [before_load]
# invalidate = "all-except-current"   # or "all"
# target = "both"                      # local, shared, both

[[dependencies]]
name = "lodash"
kind = "registry"
version = "4.17.21"

# [[dependencies]]
# name = "widgets"
# kind = "vcs"
# repo = "https://git.example.com/widgets.git"
# ref = "v1.2.0"
# postinstall = "make"

# [[dev_dependencies]]
# name = "mocha"
# kind = "registry"
# version = "10.2.0"
"#;

/// Execute the init command
pub async fn execute(args: InitArgs, ctx: &UiContext) -> DepcacheResult<()> {
    let target_dir = match args.path {
        Some(ref p) => p.clone(),
        None => std::env::current_dir()
            .map_err(|e| DepcacheError::io("getting current directory", e))?,
    };

    let config_path = target_dir.join(CONFIG_FILE_NAME);

    if config_path.exists() && !args.force {
        return Err(DepcacheError::User(format!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        )));
    }

    ensure_dir(&target_dir).await?;

    fs::write(&config_path, INIT_TEMPLATE)
        .await
        .map_err(|e| DepcacheError::io(format!("writing {}", config_path.display()), e))?;

    ui::step_ok_detail(ctx, "Created project config", &config_path.display().to_string());

    Ok(())
}

async fn ensure_dir(dir: &Path) -> DepcacheResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| DepcacheError::io(format!("creating directory {}", dir.display()), e))?;
    }
    Ok(())
}
