//! grapple - pinned GitHub release assets CLI

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use grapple_cli::cmd;
use grapple_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // -v raises the default level; RUST_LOG still wins when set.
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir)
            .with_context(|| format!("failed to change working directory to '{}'", dir.display()))?;
    }

    let platform = cli
        .platform
        .unwrap_or_else(grapple_core::platform::detect);

    match cli.command {
        Commands::Lock => cmd::lock::lock().await,
        Commands::Install { assets } => cmd::install::install(&assets, &platform).await,
        Commands::List => cmd::list::list(&platform),
    }
}
