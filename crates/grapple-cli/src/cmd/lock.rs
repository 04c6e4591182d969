//! Lock command

use std::path::Path;

use anyhow::{Context, Result};

use grapple_core::{Cache, Config, Lockfile, ReleaseClient};
use grapple_core::{CONFIG_FILE, LOCK_FILE};

/// Regenerate `grapple.lock` from the configuration: resolve every declared
/// asset against the releases API, freeze download URLs and checksums, and
/// stamp the snapshot with the configuration fingerprint.
pub async fn lock() -> Result<()> {
    let config = Config::load(Path::new(CONFIG_FILE))
        .with_context(|| format!("failed to load '{CONFIG_FILE}'"))?;

    let cache = Cache::new().context("failed to open the download cache")?;
    let releases = ReleaseClient::new(reqwest::Client::new());

    let lockfile = Lockfile::generate(&config, &releases, &cache).await?;
    lockfile.save(Path::new(LOCK_FILE))?;

    println!(
        "Lock file '{LOCK_FILE}' updated ({} assets).",
        lockfile.assets.len()
    );
    Ok(())
}
