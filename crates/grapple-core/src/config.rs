//! Asset declarations parsed from `grapple.toml`.
//!
//! A configuration declares one `[asset.<name>]` table per logical asset:
//!
//! ```toml
//! [asset.tool]
//! repo = "owner/tool"
//! version = ">=1.0.1"
//! destination = "./bin/tool"
//! executable = true
//! platform."linux/amd64" = "tool-{version}-linux-amd64.tar.gz"
//! platform.all = "tool-universal.zip"
//! extract = { globs = ["bin/*"], flatten = true }
//! ```
//!
//! The `extract` field accepts three shapes (bool, glob list, or table); it
//! is normalized into [`ExtractOptions`] exactly once, at load time, so that
//! nothing downstream branches on its shape again.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read configuration file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse configuration file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("no assets defined under the [asset] section in the config file")]
    NoAssets,

    #[error("asset '{0}' declares no platform entries")]
    NoPlatforms(String),
}

/// Top-level configuration: a map of asset name to declaration.
///
/// `BTreeMap` keeps serialization canonical, so the lock fingerprint does not
/// depend on the key order of the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Declared assets, keyed by logical name.
    pub asset: BTreeMap<String, AssetDecl>,
}

/// A single `[asset.<name>]` declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDecl {
    /// Repository identifier, `owner/name`.
    pub repo: String,
    /// Semver range expression, e.g. `>=1.0.1` or `==1.2.2`.
    pub version: String,
    /// Platform key (`"linux/amd64"`, or the sentinel `"all"`) to upstream
    /// asset-name pattern. Patterns may contain `{version}`, or be the
    /// sentinels `!tarball` / `!zipball` for hosting-generated archives.
    pub platform: BTreeMap<String, String>,
    /// Destination path for the installed asset.
    pub destination: String,
    /// Mark the installed file(s) as executable.
    #[serde(default)]
    pub executable: bool,
    /// Extraction request in any of its three accepted shapes.
    #[serde(default)]
    pub extract: ExtractField,
}

/// The `extract` field as written in the configuration file.
///
/// Accepted shapes: a boolean (`true` = extract everything), a bare list of
/// globs, or a table with `globs` and `flatten` keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractField {
    /// `extract = true` or `extract = false`
    Enabled(bool),
    /// `extract = ["bin/*", "share/man/*"]`
    Globs(Vec<String>),
    /// `extract = { globs = [...], flatten = true }`
    Options {
        #[serde(default = "default_globs")]
        globs: Vec<String>,
        #[serde(default)]
        flatten: bool,
    },
}

impl Default for ExtractField {
    fn default() -> Self {
        ExtractField::Enabled(false)
    }
}

fn default_globs() -> Vec<String> {
    vec!["*".to_string()]
}

/// Canonical extraction options, normalized from [`ExtractField`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Ordered list of glob patterns selecting archive members.
    pub globs: Vec<String>,
    /// Move extracted files out of subdirectories into the destination root.
    pub flatten: bool,
}

impl ExtractField {
    /// Normalize into canonical [`ExtractOptions`], or `None` when extraction
    /// is not requested.
    pub fn normalize(&self) -> Option<ExtractOptions> {
        match self {
            ExtractField::Enabled(false) => None,
            ExtractField::Enabled(true) => Some(ExtractOptions {
                globs: default_globs(),
                flatten: false,
            }),
            ExtractField::Globs(globs) => Some(ExtractOptions {
                globs: globs.clone(),
                flatten: false,
            }),
            ExtractField::Options { globs, flatten } => Some(ExtractOptions {
                globs: globs.clone(),
                flatten: *flatten,
            }),
        }
    }
}

impl Config {
    /// Load and validate a configuration from the given file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a TOML string (used by tests and embedders).
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.asset.is_empty() {
            return Err(ConfigError::NoAssets);
        }
        for (name, decl) in &self.asset {
            if decl.platform.is_empty() {
                return Err(ConfigError::NoPlatforms(name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(extract: &str) -> String {
        format!(
            r#"
            [asset.tool]
            repo = "owner/tool"
            version = ">=1.0.0"
            destination = "./bin/tool"
            platform."linux/amd64" = "tool-linux"
            extract = {extract}
            "#
        )
    }

    #[test]
    fn test_parse_minimal() {
        let config = Config::from_toml(&minimal("false")).unwrap();
        let decl = &config.asset["tool"];
        assert_eq!(decl.repo, "owner/tool");
        assert!(!decl.executable);
        assert!(decl.extract.normalize().is_none());
    }

    #[test]
    fn test_extract_bool_true() {
        let config = Config::from_toml(&minimal("true")).unwrap();
        let opts = config.asset["tool"].extract.normalize().unwrap();
        assert_eq!(opts.globs, vec!["*"]);
        assert!(!opts.flatten);
    }

    #[test]
    fn test_extract_glob_list() {
        let config = Config::from_toml(&minimal(r#"["bin/*", "lib/*"]"#)).unwrap();
        let opts = config.asset["tool"].extract.normalize().unwrap();
        assert_eq!(opts.globs, vec!["bin/*", "lib/*"]);
        assert!(!opts.flatten);
    }

    #[test]
    fn test_extract_table() {
        let config =
            Config::from_toml(&minimal(r#"{ globs = ["bin/*"], flatten = true }"#)).unwrap();
        let opts = config.asset["tool"].extract.normalize().unwrap();
        assert_eq!(opts.globs, vec!["bin/*"]);
        assert!(opts.flatten);
    }

    #[test]
    fn test_extract_table_defaults() {
        let config = Config::from_toml(&minimal(r#"{ flatten = true }"#)).unwrap();
        let opts = config.asset["tool"].extract.normalize().unwrap();
        assert_eq!(opts.globs, vec!["*"]);
        assert!(opts.flatten);
    }

    #[test]
    fn test_missing_required_field() {
        let toml = r#"
            [asset.tool]
            repo = "owner/tool"
            destination = "./bin/tool"
            platform."linux/amd64" = "tool-linux"
        "#;
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_no_assets() {
        assert!(matches!(
            Config::from_toml("[asset]"),
            Err(ConfigError::NoAssets)
        ));
    }

    #[test]
    fn test_no_platform_entries() {
        let toml = r#"
            [asset.tool]
            repo = "owner/tool"
            version = "*"
            destination = "./bin/tool"
            platform = {}
        "#;
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::NoPlatforms(name)) if name == "tool"
        ));
    }
}
