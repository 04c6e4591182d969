//! grapple - pinned GitHub release assets
//!
//! Keeps an inventory of GitHub release assets declared in `grapple.toml`,
//! resolves their versions against semver ranges, freezes download URLs and
//! SHA-256 checksums into a `grapple.lock` snapshot, and installs assets from
//! that snapshot through a content-addressed download cache.
//!
//! # Pipeline
//!
//! - **Lock**: [`github`] resolves each declared asset to a concrete release,
//!   [`cache`] downloads and hashes it, [`lockfile`] freezes the result and
//!   stamps it with a fingerprint of the configuration.
//! - **Install**: [`lockfile`] refuses stale snapshots, [`cache`] re-verifies
//!   every blob against its pinned checksum, [`install`] places the bytes at
//!   the declared destination (plain copy or filtered archive extraction).

pub mod cache;
pub mod config;
pub mod extract;
pub mod github;
pub mod install;
pub mod lockfile;
pub mod platform;

pub use cache::Cache;
pub use config::Config;
pub use github::ReleaseClient;
pub use lockfile::Lockfile;

/// User Agent string sent with every GitHub API and download request
pub const USER_AGENT: &str = concat!("grapple/", env!("CARGO_PKG_VERSION"));

/// Default configuration file name, resolved against the working directory.
pub const CONFIG_FILE: &str = "grapple.toml";

/// Default lock snapshot file name, resolved against the working directory.
pub const LOCK_FILE: &str = "grapple.lock";
