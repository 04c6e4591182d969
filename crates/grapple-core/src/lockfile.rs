//! Lock snapshot for reproducible installs.
//!
//! `grapple.lock` pins the exact download URL, version, and SHA-256 checksum
//! of every declared asset × platform pair, and carries a fingerprint of the
//! configuration that produced it. A snapshot whose fingerprint no longer
//! matches the current configuration is stale and refuses to install.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{Cache, CacheError};
use crate::config::Config;
use crate::extract::{ArchiveFormat, ExtractError};
use crate::github::{ReleaseClient, ResolveError};

#[derive(Error, Debug)]
pub enum LockError {
    #[error("could not load lock file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse lock file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("could not serialize lock data: {0}")]
    Serialize(serde_json::Error),

    #[error(
        "the asset list and the lock file are not in sync; \
         this can be fixed by running the 'lock' command"
    )]
    Stale,

    #[error("error when processing asset '{asset}': {source}")]
    Resolve {
        asset: String,
        source: ResolveError,
    },

    #[error("error when processing asset '{asset}': {source}")]
    Cache { asset: String, source: CacheError },

    #[error("error when processing asset '{asset}': {source}")]
    Archive {
        asset: String,
        source: ExtractError,
    },
}

/// A resolved lock entry for one asset on one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedAsset {
    pub repo: String,
    pub download_url: String,
    pub version: String,
    pub checksum: String,
    #[serde(default)]
    pub executable: bool,
    pub destination: String,
    #[serde(default)]
    pub extract: Option<LockedExtract>,
}

/// Extraction options frozen into the lock, with the archive format derived
/// from the asset-name pattern at lock-generation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedExtract {
    pub globs: Vec<String>,
    pub filetype: ArchiveFormat,
    #[serde(default)]
    pub flatten: bool,
}

/// The lock snapshot: a fingerprint plus `asset name -> platform -> entry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lockfile {
    /// SHA-256 fingerprint of the configuration that produced this snapshot.
    pub config_checksum: String,
    /// Resolved entries, keyed by asset name and platform key.
    pub assets: BTreeMap<String, BTreeMap<String, LockedAsset>>,
}

/// Fingerprint of a configuration: SHA-256 over its canonical JSON
/// serialization. `Config` uses `BTreeMap`s throughout, so declaration key
/// order in the TOML file does not affect the result.
pub fn fingerprint(config: &Config) -> Result<String, LockError> {
    let canonical = serde_json::to_vec(config).map_err(LockError::Serialize)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

impl Lockfile {
    /// Load a snapshot, optionally gating it on the current configuration.
    ///
    /// When `check` is given, a fingerprint mismatch fails with
    /// [`LockError::Stale`]; the snapshot is never auto-repaired.
    pub fn load(path: &Path, check: Option<&Config>) -> Result<Self, LockError> {
        let content = fs::read_to_string(path).map_err(|source| LockError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let lock: Lockfile = serde_json::from_str(&content).map_err(|source| LockError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        if let Some(config) = check {
            if fingerprint(config)? != lock.config_checksum {
                return Err(LockError::Stale);
            }
        }
        Ok(lock)
    }

    /// Write the snapshot as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), LockError> {
        let content = serde_json::to_string_pretty(self).map_err(LockError::Serialize)?;
        fs::write(path, content).map_err(|source| LockError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Generate a snapshot by resolving and hashing every declared
    /// asset × platform pair.
    ///
    /// Processing stops on the first failing asset; errors carry the asset
    /// name.
    pub async fn generate(
        config: &Config,
        releases: &ReleaseClient,
        cache: &Cache,
    ) -> Result<Self, LockError> {
        let mut assets = BTreeMap::new();

        for (name, decl) in &config.asset {
            info!("processing asset '{name}'");
            let entries = lock_asset(name, decl, releases, cache).await?;
            assets.insert(name.clone(), entries);
            debug!("successfully processed asset '{name}'");
        }

        Ok(Lockfile {
            config_checksum: fingerprint(config)?,
            assets,
        })
    }

    /// Entries applicable to a platform: assets with an entry for the given
    /// key, falling back to the `"all"` sentinel.
    pub fn platform_assets(&self, platform: &str) -> BTreeMap<&str, &LockedAsset> {
        self.assets
            .iter()
            .filter_map(|(name, entries)| {
                entries
                    .get(platform)
                    .or_else(|| entries.get("all"))
                    .map(|entry| (name.as_str(), entry))
            })
            .collect()
    }
}

async fn lock_asset(
    name: &str,
    decl: &crate::config::AssetDecl,
    releases: &ReleaseClient,
    cache: &Cache,
) -> Result<BTreeMap<String, LockedAsset>, LockError> {
    let wrap_resolve = |source| LockError::Resolve {
        asset: name.to_string(),
        source,
    };

    debug!(
        "fetching a release satisfying '{}' for repo '{}'",
        decl.version, decl.repo
    );
    let release = releases
        .resolve(&decl.repo, &decl.version)
        .await
        .map_err(wrap_resolve)?;
    let version = release.version().to_string();
    debug!("found release '{version}' for repo '{}'", decl.repo);

    let extract_opts = decl.extract.normalize();
    let mut entries = BTreeMap::new();

    for (plat_key, pattern) in &decl.platform {
        let download_url = crate::github::download_url(&release, pattern).map_err(wrap_resolve)?;
        debug!("found download URL for '{name}' on '{plat_key}': {download_url}");

        let extract = extract_opts
            .as_ref()
            .map(|opts| {
                Ok(LockedExtract {
                    globs: opts.globs.clone(),
                    filetype: ArchiveFormat::detect(pattern)?,
                    flatten: opts.flatten,
                })
            })
            .transpose()
            .map_err(|source| LockError::Archive {
                asset: name.to_string(),
                source,
            })?;

        info!("hashing asset '{name}' of repo '{}' for platform '{plat_key}'", decl.repo);
        let checksum = cache
            .checksum_of(releases.http(), &download_url)
            .await
            .map_err(|source| LockError::Cache {
                asset: name.to_string(),
                source,
            })?;
        debug!("computed SHA-256 checksum: {checksum}");

        entries.insert(
            plat_key.clone(),
            LockedAsset {
                repo: decl.repo.clone(),
                download_url,
                version: version.clone(),
                checksum,
                executable: decl.executable,
                destination: decl.destination.clone(),
                extract,
            },
        );
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(version_range: &str) -> Config {
        Config::from_toml(&format!(
            r#"
            [asset.tool]
            repo = "owner/tool"
            version = "{version_range}"
            destination = "./bin/tool"
            platform."linux/amd64" = "tool-linux"
            "#
        ))
        .unwrap()
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = Config::from_toml(
            r#"
            [asset.alpha]
            repo = "o/a"
            version = "*"
            destination = "a"
            platform.all = "a.zip"

            [asset.beta]
            repo = "o/b"
            version = "*"
            destination = "b"
            platform.all = "b.zip"
            "#,
        )
        .unwrap();
        let b = Config::from_toml(
            r#"
            [asset.beta]
            repo = "o/b"
            version = "*"
            destination = "b"
            platform.all = "b.zip"

            [asset.alpha]
            repo = "o/a"
            version = "*"
            destination = "a"
            platform.all = "a.zip"
            "#,
        )
        .unwrap();

        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_fingerprint_changes_on_field_change() {
        let a = config(">=1.0.0");
        let b = config(">=1.0.1");
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_load_roundtrip_and_staleness() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grapple.lock");
        let cfg = config(">=1.0.0");

        let lock = Lockfile {
            config_checksum: fingerprint(&cfg).unwrap(),
            assets: BTreeMap::new(),
        };
        lock.save(&path).unwrap();

        // Fresh check against the same declarations succeeds.
        assert!(Lockfile::load(&path, Some(&cfg)).is_ok());

        // Any mutation of the declarations makes it stale.
        let mutated = config(">=2.0.0");
        assert!(matches!(
            Lockfile::load(&path, Some(&mutated)),
            Err(LockError::Stale)
        ));

        // No check requested: loads regardless.
        assert!(Lockfile::load(&path, None).is_ok());
    }

    #[test]
    fn test_platform_assets_all_fallback() {
        let entry = LockedAsset {
            repo: "o/t".into(),
            download_url: "https://example.com/dl/t".into(),
            version: "1.0.0".into(),
            checksum: "00".into(),
            executable: false,
            destination: "t".into(),
            extract: None,
        };

        let mut universal = BTreeMap::new();
        universal.insert("all".to_string(), entry.clone());
        let mut linux_only = BTreeMap::new();
        linux_only.insert("linux/amd64".to_string(), entry);

        let mut assets = BTreeMap::new();
        assets.insert("universal".to_string(), universal);
        assets.insert("linux".to_string(), linux_only);
        let lock = Lockfile {
            config_checksum: String::new(),
            assets,
        };

        let linux = lock.platform_assets("linux/amd64");
        assert_eq!(linux.len(), 2);

        let mac = lock.platform_assets("darwin/arm64");
        assert_eq!(mac.len(), 1);
        assert!(mac.contains_key("universal"));
    }

    #[tokio::test]
    async fn test_generate_freezes_highest_matching_release() {
        let mut server = mockito::Server::new_async().await;
        let body = b"tool binary bytes".to_vec();
        let dl_url = format!("{}/dl/tool-linux", server.url());

        server
            .mock("GET", "/repos/owner/tool/releases")
            .with_status(200)
            .with_body(
                serde_json::json!([
                    {
                        "tag_name": "v0.9.0",
                        "prerelease": false,
                        "assets": [{"name": "tool-linux", "browser_download_url": format!("{}/dl/old", server.url())}],
                        "tarball_url": "https://x/tarball/v0.9.0",
                        "zipball_url": "https://x/zipball/v0.9.0"
                    },
                    {
                        "tag_name": "v1.2.0",
                        "prerelease": false,
                        "assets": [{"name": "tool-linux", "browser_download_url": dl_url.clone()}],
                        "tarball_url": "https://x/tarball/v1.2.0",
                        "zipball_url": "https://x/zipball/v1.2.0"
                    }
                ])
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/dl/tool-linux")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let cache = Cache::with_root(dir.path()).unwrap();
        let releases = ReleaseClient::with_api_root(reqwest::Client::new(), server.url());
        let cfg = config(">=1.0.0");

        let lock = Lockfile::generate(&cfg, &releases, &cache).await.unwrap();

        assert_eq!(lock.config_checksum, fingerprint(&cfg).unwrap());
        let entry = &lock.assets["tool"]["linux/amd64"];
        assert_eq!(entry.version, "1.2.0");
        assert_eq!(entry.download_url, dl_url);
        assert_eq!(
            entry.checksum,
            hex::encode(Sha256::digest(&body))
        );
        assert!(!entry.executable);
        assert!(entry.extract.is_none());
    }

    #[tokio::test]
    async fn test_generate_wraps_errors_with_asset_name() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/owner/tool/releases")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let cache = Cache::with_root(dir.path()).unwrap();
        let releases = ReleaseClient::with_api_root(reqwest::Client::new(), server.url());

        let err = Lockfile::generate(&config(">=1.0.0"), &releases, &cache)
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Resolve { ref asset, .. } if asset == "tool"));
    }
}
