//! Archive extraction with glob-based member selection.
//!
//! Handles tar, tar.gz, and zip archives. Members are filtered against an
//! ordered list of glob patterns before extraction; an empty match set is an
//! error, not a silent no-op. Member paths that would escape the destination
//! are rejected, and link entries from untrusted archives are skipped.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::github::{TARBALL_SENTINEL, ZIPBALL_SENTINEL};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported archive type for extraction: {0}")]
    UnsupportedArchiveType(String),

    #[error("invalid glob pattern '{pattern}': {source}")]
    BadGlob {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("globs did not match any files in the archive")]
    NoMatchesForGlobs,

    #[error("archive error: {0}")]
    Archive(String),
}

/// Closed set of supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[serde(rename = "tar")]
    Tar,
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "zip")]
    Zip,
}

impl ArchiveFormat {
    /// Classify an archive from its filename suffix or archive-source
    /// sentinel (`!tarball` / `!zipball`).
    pub fn detect(name: &str) -> Result<Self, ExtractError> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") || name == TARBALL_SENTINEL {
            Ok(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar") {
            Ok(ArchiveFormat::Tar)
        } else if name.ends_with(".zip") || name == ZIPBALL_SENTINEL {
            Ok(ArchiveFormat::Zip)
        } else {
            Err(ExtractError::UnsupportedArchiveType(name.to_string()))
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Zip => "zip",
        };
        write!(f, "{s}")
    }
}

/// Filter member names against an ordered list of globs.
///
/// Globs are applied in declared order over a shrinking candidate set: each
/// glob claims every remaining member it matches, so a member is yielded at
/// most once and results are grouped by the glob that first claimed it.
/// Within a group, archive order is preserved.
pub fn select_members(names: &[String], globs: &[String]) -> Result<Vec<String>, ExtractError> {
    let patterns: Vec<Pattern> = globs
        .iter()
        .map(|g| {
            Pattern::new(g).map_err(|source| ExtractError::BadGlob {
                pattern: g.clone(),
                source,
            })
        })
        .collect::<Result<_, _>>()?;

    let mut remaining: Vec<&String> = names.iter().collect();
    let mut selected = Vec::new();

    for pattern in &patterns {
        let mut unclaimed = Vec::with_capacity(remaining.len());
        for name in remaining {
            if pattern.matches(name) {
                selected.push(name.clone());
            } else {
                unclaimed.push(name);
            }
        }
        remaining = unclaimed;
    }

    if selected.is_empty() {
        return Err(ExtractError::NoMatchesForGlobs);
    }
    Ok(selected)
}

/// Extract the members of `archive` selected by `globs` into `destination`.
///
/// The destination directory is created only after member selection
/// succeeds, so a glob mismatch never leaves a partially populated tree.
/// With `flatten`, files extracted into subdirectories are moved up into the
/// destination root afterwards.
pub fn extract(
    archive: &Path,
    destination: &Path,
    format: ArchiveFormat,
    globs: &[String],
    flatten: bool,
) -> Result<(), ExtractError> {
    info!("extracting '{}' to '{}'", archive.display(), destination.display());

    let names = list_members(archive, format)?;
    let selected: HashSet<String> = select_members(&names, globs)?.into_iter().collect();

    fs::create_dir_all(destination)?;
    match format {
        ArchiveFormat::Tar => {
            let file = File::open(archive)?;
            extract_tar(BufReader::new(file), destination, &selected)?;
        }
        ArchiveFormat::TarGz => {
            let file = File::open(archive)?;
            extract_tar(GzDecoder::new(BufReader::new(file)), destination, &selected)?;
        }
        ArchiveFormat::Zip => extract_zip(archive, destination, &selected)?,
    }

    if flatten {
        flatten_tree(destination)?;
    }

    debug!("successfully extracted '{}'", archive.display());
    Ok(())
}

/// List all member names of an archive.
///
/// Tar readers are single-pass, so extraction reopens the archive after this
/// listing pass.
fn list_members(archive: &Path, format: ArchiveFormat) -> Result<Vec<String>, ExtractError> {
    match format {
        ArchiveFormat::Tar => {
            let file = File::open(archive)?;
            tar_member_names(BufReader::new(file))
        }
        ArchiveFormat::TarGz => {
            let file = File::open(archive)?;
            tar_member_names(GzDecoder::new(BufReader::new(file)))
        }
        ArchiveFormat::Zip => {
            let file = File::open(archive)?;
            let zip = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;
            Ok(zip.file_names().map(str::to_string).collect())
        }
    }
}

fn tar_member_names<R: Read>(reader: R) -> Result<Vec<String>, ExtractError> {
    let mut tar = tar::Archive::new(reader);
    let mut names = Vec::new();
    for entry in tar.entries()? {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}

fn extract_tar<R: Read>(
    reader: R,
    destination: &Path,
    selected: &HashSet<String>,
) -> Result<(), ExtractError> {
    let mut tar = tar::Archive::new(reader);

    for entry in tar.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        if !selected.contains(&name) {
            continue;
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            debug!("skipping link entry '{name}' from untrusted archive");
            continue;
        }

        let relative_path: PathBuf = entry.path()?.components().collect();
        let absolute_path = sanitized_join(destination, &relative_path)?;

        if entry_type.is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&absolute_path)?;
    }

    Ok(())
}

fn extract_zip(
    archive: &Path,
    destination: &Path,
    selected: &HashSet<String>,
) -> Result<(), ExtractError> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;

    for i in 0..zip.len() {
        let mut member = zip
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        if !selected.contains(member.name()) {
            continue;
        }

        let relative_path = member.enclosed_name().ok_or_else(|| {
            ExtractError::Archive(format!("invalid path in archive: {}", member.name()))
        })?;
        let absolute_path = sanitized_join(destination, &relative_path)?;

        if member.is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut member, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = member.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(())
}

/// Join a member path onto the destination, rejecting escapes.
fn sanitized_join(destination: &Path, relative: &Path) -> Result<PathBuf, ExtractError> {
    let escapes = relative.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    let joined = destination.join(relative);
    if escapes || !joined.starts_with(destination) {
        return Err(ExtractError::Archive(format!(
            "invalid path in archive: {}",
            relative.display()
        )));
    }
    Ok(joined)
}

/// Move every file found in a subdirectory of `destination` up into
/// `destination` itself, overwriting on name collision, then remove
/// now-empty subdirectories bottom-up (best effort).
fn flatten_tree(destination: &Path) -> Result<(), ExtractError> {
    let nested: Vec<PathBuf> = walkdir::WalkDir::new(destination)
        .min_depth(2)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    for src in nested {
        let Some(name) = src.file_name() else { continue };
        let target = destination.join(name);
        if target.exists() {
            fs::remove_file(&target)?;
        }
        fs::rename(&src, &target)?;
    }

    for entry in walkdir::WalkDir::new(destination)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
    {
        // Non-empty directories are left in place.
        fs::remove_dir(entry.path()).ok();
    }

    Ok(())
}
