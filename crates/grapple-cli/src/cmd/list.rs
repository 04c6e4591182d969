//! List command

use std::path::Path;

use anyhow::{Context, Result};

use grapple_core::{CONFIG_FILE, LOCK_FILE};
use grapple_core::{Config, Lockfile};

/// Print the resolved assets for a platform, sorted by name.
pub fn list(platform: &str) -> Result<()> {
    let config = Config::load(Path::new(CONFIG_FILE))
        .with_context(|| format!("failed to load '{CONFIG_FILE}'"))?;
    let lockfile = Lockfile::load(Path::new(LOCK_FILE), Some(&config))?;

    for (name, asset) in lockfile.platform_assets(platform) {
        println!("{name} {} {}", asset.version, asset.download_url);
    }

    Ok(())
}
