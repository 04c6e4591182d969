//! Content-addressed download cache.
//!
//! Blobs are stored under a deterministic path derived from the download URL
//! (SHA-256 of the URL plus a readable suffix), alongside a `.sha256` sidecar
//! holding the digest of the blob's bytes. Once a blob exists it is treated
//! as immutable: a later checksum mismatch evicts both files so the next
//! attempt is a clean re-download.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::USER_AGENT;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download of '{url}' failed: {source}")]
    Download { url: String, source: reqwest::Error },

    #[error("download of '{url}' failed: HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("malformed download URL: {0}")]
    MalformedUrl(String),

    #[error("hash mismatch for URL '{url}': computed '{got}', expected '{expected}'")]
    ChecksumMismatch {
        url: String,
        expected: String,
        got: String,
    },
}

/// Suffix appended to a blob path to form its checksum sidecar path.
const CHECKSUM_SUFFIX: &str = ".sha256";

/// On-disk cache keyed by download URL.
#[derive(Debug)]
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    /// Cache rooted at the platform user cache directory.
    pub fn new() -> std::io::Result<Self> {
        let root = dirs::cache_dir()
            .ok_or_else(|| std::io::Error::other("could not determine user cache directory"))?
            .join("grapple");
        Self::with_root(root)
    }

    /// Cache at a custom root (for testing).
    pub fn with_root(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Deterministic blob path for a URL.
    ///
    /// The file name is the SHA-256 of the URL bytes joined with the URL's
    /// trailing path segment. Hosting-generated `tarball`/`zipball` URLs use
    /// a `{repo}-{tarball|zipball}` suffix instead, so repeated source-archive
    /// downloads for the same repository collapse to one slot per kind.
    pub fn blob_path(&self, url: &str) -> Result<PathBuf, CacheError> {
        let url_hash = hex::encode(Sha256::digest(url.as_bytes()));

        let segments: Vec<&str> = url.split('/').collect();
        if segments.len() < 3 {
            return Err(CacheError::MalformedUrl(url.to_string()));
        }

        let kind = segments[segments.len() - 2];
        let name = if kind == "tarball" || kind == "zipball" {
            let repo = segments[segments.len() - 3];
            format!("{repo}-{kind}")
        } else {
            segments[segments.len() - 1].to_string()
        };

        Ok(self.root.join(format!("{url_hash}-{name}")))
    }

    /// Sidecar path holding the SHA-256 digest of the blob for a URL.
    pub fn checksum_path(&self, url: &str) -> Result<PathBuf, CacheError> {
        let blob = self.blob_path(url)?;
        let mut name = blob.file_name().unwrap_or_default().to_os_string();
        name.push(CHECKSUM_SUFFIX);
        Ok(blob.with_file_name(name))
    }

    /// Download a URL into the cache, or return the existing blob unchanged.
    ///
    /// The response body is streamed to a temporary file in the cache root
    /// and renamed into place on success, so a partially written blob is
    /// never observed as cached. The digest computed during the streaming
    /// pass is persisted to the sidecar.
    pub async fn fetch(&self, client: &reqwest::Client, url: &str) -> Result<PathBuf, CacheError> {
        let blob = self.blob_path(url)?;
        if blob.exists() {
            debug!("cache hit for {url}");
            return Ok(blob);
        }

        info!("downloading {url} into cache");
        let resp = client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|source| CacheError::Download {
                url: url.to_string(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(CacheError::Status {
                url: url.to_string(),
                status: resp.status(),
            });
        }

        let tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        let mut file = tokio::fs::File::create(tmp.path()).await?;
        let mut hasher = Sha256::new();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| CacheError::Download {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
        }
        file.flush().await?;
        drop(file);

        let digest = hex::encode(hasher.finalize());
        tmp.persist(&blob).map_err(|e| CacheError::Io(e.error))?;
        fs::write(self.checksum_path(url)?, &digest)?;

        debug!("download to cache completed: {}", blob.display());
        Ok(blob)
    }

    /// SHA-256 digest of the content at a URL.
    ///
    /// Served from the sidecar when present (zero network cost); otherwise
    /// the URL is fetched and the digest computed and persisted.
    pub async fn checksum_of(
        &self,
        client: &reqwest::Client,
        url: &str,
    ) -> Result<String, CacheError> {
        let sidecar = self.checksum_path(url)?;
        if sidecar.exists() {
            debug!("using cached checksum for {url}");
            return Ok(fs::read_to_string(&sidecar)?.trim().to_string());
        }

        let blob = self.fetch(client, url).await?;
        if sidecar.exists() {
            // fetch just downloaded and hashed it
            return Ok(fs::read_to_string(&sidecar)?.trim().to_string());
        }

        // Blob present from an earlier run but its sidecar is missing.
        let digest = sha256_file(&blob)?;
        fs::write(&sidecar, &digest)?;
        Ok(digest)
    }

    /// Fetch a URL and verify the blob against an expected digest.
    ///
    /// Runs on every install, including cache hits: a previously cached but
    /// corrupted file must still be caught. On mismatch the blob and its
    /// sidecar are both deleted so the next attempt re-downloads cleanly.
    pub async fn fetch_and_verify(
        &self,
        client: &reqwest::Client,
        url: &str,
        expected: &str,
    ) -> Result<PathBuf, CacheError> {
        let blob = self.fetch(client, url).await?;
        let got = sha256_file(&blob)?;

        if got != expected {
            fs::remove_file(&blob).ok();
            if let Ok(sidecar) = self.checksum_path(url) {
                fs::remove_file(sidecar).ok();
            }
            return Err(CacheError::ChecksumMismatch {
                url: url.to_string(),
                expected: expected.to_string(),
                got,
            });
        }

        Ok(blob)
    }
}

/// SHA-256 of a file, computed in 64 KiB chunks.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
