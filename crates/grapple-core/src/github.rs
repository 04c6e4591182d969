//! GitHub release resolution.
//!
//! Queries the releases API for a repository, filters the tags through a
//! semver range, and materializes the download URL for a named asset.

use semver::{Version, VersionReq};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::USER_AGENT;

/// Default API root for release queries.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Sentinel asset name for the hosting-generated source tarball.
pub const TARBALL_SENTINEL: &str = "!tarball";

/// Sentinel asset name for the hosting-generated source zipball.
pub const ZIPBALL_SENTINEL: &str = "!zipball";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response when fetching releases for repo '{repo}': HTTP {status}")]
    Api {
        repo: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid version requirement '{range}': {source}")]
    InvalidRange {
        range: String,
        source: semver::Error,
    },

    #[error("no releases match version requirement '{range}' for repo '{repo}'")]
    NoMatchingRelease { repo: String, range: String },

    #[error("could not find asset '{name}' in release '{tag}'")]
    AssetNotFound { name: String, tag: String },
}

/// A release as returned by `GET /repos/{repo}/releases`.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
    pub tarball_url: String,
    pub zipball_url: String,
}

/// A named asset published under a release.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl Release {
    /// Version string for this release: the tag with a leading `v` stripped.
    pub fn version(&self) -> &str {
        self.tag_name.strip_prefix('v').unwrap_or(&self.tag_name)
    }
}

/// Client for the releases API.
///
/// The API root is injectable so tests can point it at a local mock server
/// instead of the live service.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    http: reqwest::Client,
    api_root: String,
}

impl ReleaseClient {
    /// Client against the public GitHub API.
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_api_root(http, GITHUB_API_URL)
    }

    /// Client against a custom API root (mock servers, GitHub Enterprise).
    pub fn with_api_root(http: reqwest::Client, api_root: impl Into<String>) -> Self {
        Self {
            http,
            api_root: api_root.into(),
        }
    }

    /// The underlying HTTP client, shared with cache downloads.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fetch all releases for a repository in a single call.
    pub async fn releases(&self, repo: &str) -> Result<Vec<Release>, ResolveError> {
        let url = format!("{}/repos/{}/releases", self.api_root, repo);
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ResolveError::Api {
                repo: repo.to_string(),
                status: resp.status(),
            });
        }

        Ok(resp.json().await?)
    }

    /// Resolve the highest non-prerelease release of `repo` matching `range`.
    ///
    /// Tags that do not parse as semver (after stripping a leading `v`) and
    /// releases marked prerelease are skipped silently; both are logged at
    /// debug level.
    pub async fn resolve(&self, repo: &str, range: &str) -> Result<Release, ResolveError> {
        let req = parse_range(range)?;
        let releases = self.releases(repo).await?;

        let mut best: Option<(Release, Version)> = None;
        for release in releases {
            let version_str = release.version();
            let version = match Version::parse(version_str) {
                Ok(v) => v,
                Err(_) => {
                    debug!("skipping non semver-compliant tag '{}' from repo '{repo}'", release.tag_name);
                    continue;
                }
            };

            if release.prerelease {
                debug!("skipping prerelease version '{version_str}' from repo '{repo}'");
                continue;
            }
            if !req.matches(&version) {
                debug!(
                    "skipping version '{version_str}' from repo '{repo}': does not match '{range}'"
                );
                continue;
            }

            match &best {
                Some((_, current)) if *current >= version => {}
                _ => best = Some((release, version)),
            }
        }

        best.map(|(release, _)| release)
            .ok_or_else(|| ResolveError::NoMatchingRelease {
                repo: repo.to_string(),
                range: range.to_string(),
            })
    }
}

/// Parse a version range expression into a [`VersionReq`].
///
/// The `==` operator is accepted as a synonym for `=`. A bare version with
/// no operator (`"1.2.3"`) keeps [`VersionReq`] caret semantics, matching
/// any compatible release; exact pinning requires an explicit `=`/`==`.
pub fn parse_range(range: &str) -> Result<VersionReq, ResolveError> {
    let normalized = range
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.strip_prefix("==")
                .map_or_else(|| part.to_string(), |rest| format!("={rest}"))
        })
        .collect::<Vec<_>>()
        .join(", ");

    VersionReq::parse(&normalized).map_err(|source| ResolveError::InvalidRange {
        range: range.to_string(),
        source,
    })
}

/// Materialize the download URL for an asset-name pattern within a release.
///
/// The sentinels `!tarball` / `!zipball` select the hosting-generated source
/// archives (these are synthesized by the host and not listed among named
/// release assets). Otherwise `{version}` is substituted into the pattern and
/// the asset whose published name equals the result is returned. Exact-match
/// only.
pub fn download_url(release: &Release, pattern: &str) -> Result<String, ResolveError> {
    match pattern {
        TARBALL_SENTINEL => return Ok(release.tarball_url.clone()),
        ZIPBALL_SENTINEL => return Ok(release.zipball_url.clone()),
        _ => {}
    }

    let expected = pattern.replace("{version}", release.version());
    release
        .assets
        .iter()
        .find(|a| a.name == expected)
        .map(|a| a.browser_download_url.clone())
        .ok_or_else(|| ResolveError::AssetNotFound {
            name: pattern.to_string(),
            tag: release.tag_name.clone(),
        })
}
