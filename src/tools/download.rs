//! # Download
//!
//! Streams a tool artifact into a temporary file inside the install directory.
//!
//! The temporary file lives next to its final location so the install step can
//! be a single atomic rename.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, info_span, Instrument};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download from {url} failed: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to write artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("partial download detected: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("downloaded artifact is empty")]
    Empty,

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Download `url` into a fresh temporary file inside `dir`.
///
/// When `expected_sha256` is given the artifact is verified before it is
/// returned. On any error the temporary file is removed when dropped.
pub async fn download_artifact(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    expected_sha256: Option<&str>,
) -> Result<NamedTempFile, DownloadError> {
    let span = info_span!("tool.download", artifact.url = url);
    fetch(client, url, dir, expected_sha256)
        .instrument(span)
        .await
}

async fn fetch(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    expected_sha256: Option<&str>,
) -> Result<NamedTempFile, DownloadError> {
    let start = Instant::now();

    info!("Downloading artifact from {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| {
            error!("Failed to download artifact from {}: {}", url, source);
            DownloadError::Request {
                url: url.to_string(),
                source,
            }
        })?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        error!("Artifact download failed: HTTP {} from {}", status, url);
        return Err(DownloadError::Status {
            url: url.to_string(),
            status,
        });
    }

    let expected_size = response.content_length();

    let temp = NamedTempFile::new_in(dir)?;
    let mut file = tokio::fs::File::from_std(temp.reopen()?);

    let mut downloaded_size: u64 = 0;
    let mut hasher = Sha256::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?;
        downloaded_size += chunk.len() as u64;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if let Some(expected) = expected_size {
        if downloaded_size != expected {
            return Err(DownloadError::SizeMismatch {
                expected,
                actual: downloaded_size,
            });
        }
    }

    if downloaded_size == 0 {
        return Err(DownloadError::Empty);
    }

    if let Some(expected) = expected_sha256 {
        let actual = format!("{:x}", hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(DownloadError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        debug!("Checksum verified: {}", expected);
    }

    info!(
        size_bytes = downloaded_size,
        duration_ms = start.elapsed().as_millis() as u64,
        "Downloaded artifact"
    );
    Ok(temp)
}
