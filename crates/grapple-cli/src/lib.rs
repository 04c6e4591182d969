//! grapple - pinned GitHub release assets
//!
//! Command-line surface for the grapple asset manager: `lock` regenerates
//! the `grapple.lock` snapshot from `grapple.toml`, `install` materializes
//! assets from the snapshot, and `list` prints the resolved assets for a
//! platform.

pub mod cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "grapple")]
#[command(author, version, about = "Pinned GitHub release assets")]
pub struct Cli {
    /// The platform to choose when determining which assets to work on,
    /// e.g. linux/amd64, darwin/arm64. Defaults to the current platform.
    #[arg(short, long, global = true)]
    pub platform: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// The working directory (defaults to the current working directory)
    #[arg(short, long, global = true)]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Update the lock file from the configuration
    Lock,
    /// Install assets as pinned by the lock file
    Install {
        /// Specific asset names to install. If omitted, install all assets
        /// available for the target platform.
        assets: Vec<String>,
    },
    /// List resolved assets for a platform
    List,
}
