//! depcache - tiered dependency cache for build agents
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use depcache::cli::commands::{self, InvalidateMode};
use depcache::cli::{Cli, Commands, Project};
use depcache::error::DepcacheResult;
use depcache::ui::{self, UiContext};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> DepcacheResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("depcache=warn"),
        1 => EnvFilter::new("depcache=info"),
        _ => EnvFilter::new("depcache=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    ui::init_theme();
    let ctx = UiContext::detect().with_verbose(cli.verbose > 0);

    // Init command doesn't need config loading
    if let Commands::Init(args) = cli.command {
        return commands::init(args, &ctx).await;
    }

    let project = Project::load(&cli).await?;

    match cli.command {
        Commands::Init(_) => unreachable!("Init handled above"),
        Commands::Install => commands::install(&project, &ctx).await,
        Commands::InvalidateExact(args) => {
            commands::invalidate(&project, &ctx, InvalidateMode::Exact, args).await
        }
        Commands::InvalidateAll(args) => {
            commands::invalidate(&project, &ctx, InvalidateMode::All, args).await
        }
        Commands::InvalidateAllExceptCurrent(args) => {
            commands::invalidate(&project, &ctx, InvalidateMode::AllExceptCurrent, args).await
        }
        Commands::Fingerprint(args) => commands::fingerprint(&project, &ctx, args).await,
        Commands::Status => commands::status(&project, &ctx).await,
    }
}
