//! Installer orchestration.
//!
//! Resolves the lock entry for a platform, runs the cached download through
//! checksum verification, and places the result at the declared destination,
//! either as a plain copy or through filtered archive extraction. Installs
//! are idempotent replacements: a pre-existing destination is removed first,
//! never merged into.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::cache::{Cache, CacheError};
use crate::extract::{self, ExtractError};
use crate::lockfile::LockedAsset;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("asset '{asset}' has no entry for platform '{platform}' or 'all'")]
    NoPlatformEntry { asset: String, platform: String },

    #[error("error when installing asset '{asset}': {source}")]
    Cache { asset: String, source: CacheError },

    #[error("error when installing asset '{asset}': {source}")]
    Extract {
        asset: String,
        source: ExtractError,
    },

    #[error("error when installing asset '{asset}': {source}")]
    Io {
        asset: String,
        source: std::io::Error,
    },
}

/// Install one asset for a platform from its lock entries.
///
/// Falls back to the `"all"` sentinel when the platform key has no entry of
/// its own.
pub async fn install_asset(
    name: &str,
    platform: &str,
    entries: &BTreeMap<String, LockedAsset>,
    cache: &Cache,
    client: &reqwest::Client,
) -> Result<(), InstallError> {
    let entry = entries
        .get(platform)
        .or_else(|| entries.get("all"))
        .ok_or_else(|| InstallError::NoPlatformEntry {
            asset: name.to_string(),
            platform: platform.to_string(),
        })?;

    let wrap_io = |source| InstallError::Io {
        asset: name.to_string(),
        source,
    };

    debug!(
        "downloading asset '{name}' from '{}' and verifying checksum '{}'",
        entry.download_url, entry.checksum
    );
    let blob = cache
        .fetch_and_verify(client, &entry.download_url, &entry.checksum)
        .await
        .map_err(|source| InstallError::Cache {
            asset: name.to_string(),
            source,
        })?;

    let destination = Path::new(&entry.destination);
    if destination.exists() {
        debug!("removing destination path '{}' of asset '{name}'", destination.display());
        if destination.is_dir() {
            fs::remove_dir_all(destination).map_err(wrap_io)?;
        } else {
            fs::remove_file(destination).map_err(wrap_io)?;
        }
    }

    if let Some(opts) = &entry.extract {
        debug!("extracting asset '{name}' to '{}'", destination.display());
        extract::extract(&blob, destination, opts.filetype, &opts.globs, opts.flatten).map_err(
            |source| InstallError::Extract {
                asset: name.to_string(),
                source,
            },
        )?;
    } else {
        debug!("copying asset '{name}' to '{}'", destination.display());
        // fs::copy carries permission bits but not timestamps.
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(wrap_io)?;
            }
        }
        fs::copy(&blob, destination).map_err(wrap_io)?;
    }

    if entry.executable {
        debug!("marking '{}' as executable", destination.display());
        chmod_exec(destination).map_err(wrap_io)?;
    }

    Ok(())
}

/// Grant execute permission on a file, or recursively on every regular file
/// under a directory. No-op on non-unix targets.
#[cfg(unix)]
fn chmod_exec(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let add_exec = |file: &Path| -> std::io::Result<()> {
        let mode = file.metadata()?.permissions().mode();
        fs::set_permissions(file, fs::Permissions::from_mode(mode | 0o111))
    };

    if path.is_dir() {
        for entry in walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            add_exec(entry.path())?;
        }
        Ok(())
    } else {
        add_exec(path)
    }
}

#[cfg(not(unix))]
fn chmod_exec(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
