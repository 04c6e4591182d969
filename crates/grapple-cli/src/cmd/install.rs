//! Install command

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::debug;

use grapple_core::install::install_asset;
use grapple_core::{CONFIG_FILE, LOCK_FILE};
use grapple_core::{Cache, Config, Lockfile};

/// Install assets from the lock snapshot for the target platform.
///
/// The snapshot is gated on the current configuration first: a stale lock
/// aborts the whole run. With no names given, every asset that has an entry
/// for the platform (or the `"all"` sentinel) is installed.
pub async fn install(assets: &[String], platform: &str) -> Result<()> {
    let config = Config::load(Path::new(CONFIG_FILE))
        .with_context(|| format!("failed to load '{CONFIG_FILE}'"))?;
    let lockfile = Lockfile::load(Path::new(LOCK_FILE), Some(&config))?;

    let cache = Cache::new().context("failed to open the download cache")?;
    let client = reqwest::Client::new();

    debug!("target platform: {platform}");
    let names: Vec<String> = if assets.is_empty() {
        lockfile
            .platform_assets(platform)
            .keys()
            .map(|name| (*name).to_string())
            .collect()
    } else {
        assets.to_vec()
    };

    for name in &names {
        let Some(entries) = lockfile.assets.get(name) else {
            bail!("asset '{name}' not found in the lock file");
        };

        println!("Installing asset '{name}'...");
        install_asset(name, platform, entries, &cache, &client).await?;
        debug!("successfully installed asset '{name}'");
    }

    println!("Installed {} assets.", names.len());
    Ok(())
}
