//! Streaming download with progress reporting and content hashing.
//!
//! The binary is hashed while it is written, so the caller gets the digest
//! of exactly the bytes that landed on disk. Partial files are removed on
//! any failure.

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::utils::errors::{FetchError, Result};
use crate::USER_AGENT;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Progress callback: (bytes downloaded, total bytes if known).
pub type ProgressFn = dyn Fn(u64, Option<u64>) + Send + Sync;

/// Result of a completed download.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

/// Downloads update binaries from the distribution server.
pub struct Downloader {
    http: reqwest::Client,
}

impl Downloader {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Download `url` to `dest`, streaming chunks through a SHA-256 hasher.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<DownloadResult> {
        info!(url, dest = %dest.display(), "downloading update");

        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(e.into());
                }
            };

            hasher.update(&chunk);
            if let Err(e) = file.write_all(&chunk).await {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(e.into());
            }

            downloaded += chunk.len() as u64;
            if let Some(progress) = progress {
                progress(downloaded, total);
            }
        }

        file.flush().await?;
        let sha256 = hex::encode(hasher.finalize());

        info!(size = downloaded, sha256, "download complete");

        Ok(DownloadResult {
            path: dest.to_path_buf(),
            size: downloaded,
            sha256,
        })
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the lowercase hex SHA-256 digest of a file's content.
pub fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_sha256_known_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"hello").unwrap();

        assert_eq!(
            file_sha256(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_file_sha256_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        assert_eq!(
            file_sha256(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_sha256_missing_file() {
        let dir = tempdir().unwrap();
        assert!(file_sha256(&dir.path().join("missing")).is_err());
    }
}
