//! Resumable, retrying artifact downloader.
//!
//! Downloads stream to the destination in append mode so an interrupted
//! transfer can be resumed with a `Range` request on the next attempt.
//! Verification is a separate step the caller runs after the transfer
//! completes; a checksum mismatch is never retried as a transport failure.

use crate::forge::ReleaseAsset;
use futures::StreamExt;
use rand::Rng;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("IO error writing download: {0}")]
    Io(#[from] std::io::Error),
    #[error("server rejected the request with status {0}")]
    TerminalClientError(StatusCode),
    #[error("download cancelled")]
    Cancelled,
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<DownloadError>,
    },
    #[error("verification failed for {path}: {reason}")]
    Verification { path: PathBuf, reason: String },
}

/// Retry and resume behavior for one transfer.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub retries: u32,
    /// Per-attempt timeout; the only in-flight cancellation.
    pub timeout: Duration,
    pub backoff_base: Duration,
    /// Uniform jitter applied to each backoff, as a fraction of the delay.
    pub jitter_factor: f64,
    pub resume: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: 3,
            timeout: Duration::from_secs(120),
            backoff_base: Duration::from_millis(500),
            jitter_factor: 0.2,
            resume: true,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff_base.as_secs_f64() * 2f64.powi(attempt as i32);
        let jitter = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor)
        } else {
            0.0
        };
        Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0))
    }
}

/// Streams URLs to files, serializing writers that target the same path.
pub struct Downloader {
    client: reqwest::Client,
    policy: RetryPolicy,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    cancel: Arc<AtomicBool>,
}

impl Downloader {
    pub fn new(policy: RetryPolicy) -> Self {
        Downloader {
            client: reqwest::Client::new(),
            policy,
            locks: Mutex::new(HashMap::new()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting cooperative cancellation. Checked between
    /// attempts, not mid-stream.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    async fn path_lock(&self, dest: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(dest.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Download `url` to `dest`, resuming a partial file when the policy
    /// allows and retrying transport failures with exponential backoff.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let lock = self.path_lock(dest).await;
        let _guard = lock.lock().await;

        let mut last_err: Option<DownloadError> = None;
        let mut attempts = 0u32;

        while attempts <= self.policy.retries {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(DownloadError::Cancelled);
            }
            if attempts > 0 {
                let delay = self.policy.backoff(attempts - 1);
                debug!("Retrying {} in {:?} (attempt {})", url, delay, attempts + 1);
                tokio::time::sleep(delay).await;
            }
            attempts += 1;

            match self.attempt(url, dest).await {
                Ok(()) => {
                    info!("Downloaded {} -> {}", url, dest.display());
                    return Ok(());
                }
                Err(DownloadError::TerminalClientError(status)) => {
                    warn!("Terminal status {} for {}", status, url);
                    return Err(DownloadError::TerminalClientError(status));
                }
                Err(e) => {
                    warn!("Attempt {} failed for {}: {}", attempts, url, e);
                    last_err = Some(e);
                }
            }
        }

        Err(DownloadError::RetriesExhausted {
            attempts,
            last: Box::new(last_err.unwrap_or(DownloadError::Cancelled)),
        })
    }

    async fn attempt(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let offset = if self.policy.resume {
            tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };

        let mut request = self.client.get(url).timeout(self.policy.timeout);
        if offset > 0 {
            debug!("Resuming {} at byte {}", url, offset);
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_client_error() {
            return Err(DownloadError::TerminalClientError(status));
        }
        // 5xx and friends go through the retryable path
        let response = match response.error_for_status() {
            Ok(r) => r,
            Err(e) => return Err(DownloadError::Request(e)),
        };

        if offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            // Server ignored the range; drop the partial and start over on
            // the next attempt
            warn!("Range ignored for {}; discarding partial file", url);
            tokio::fs::remove_file(dest).await?;
            return Err(DownloadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "server ignored range request",
            )));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = if offset > 0 {
            OpenOptions::new().append(true).open(dest).await?
        } else {
            File::create(dest).await?
        };

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

/// Post-transfer integrity check against the catalog's asset metadata.
///
/// Only the fields the asset actually carries are checked; an asset with
/// neither size nor checksum verifies trivially.
pub async fn verify_download(path: &Path, asset: &ReleaseAsset) -> Result<(), DownloadError> {
    let metadata = tokio::fs::metadata(path).await?;

    if let Some(expected) = asset.size {
        if metadata.len() != expected {
            return Err(DownloadError::Verification {
                path: path.to_path_buf(),
                reason: format!("size mismatch: expected {}, got {}", expected, metadata.len()),
            });
        }
    }

    if let Some(expected) = &asset.sha256 {
        let actual = sha256_file(path).await?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(DownloadError::Verification {
                path: path.to_path_buf(),
                reason: format!("sha256 mismatch: expected {}, got {}", expected, actual),
            });
        }
    }

    Ok(())
}

async fn sha256_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
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

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            backoff_base: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_jitter_stays_in_band() {
        let policy = RetryPolicy {
            jitter_factor: 0.2,
            backoff_base: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let d = policy.backoff(1).as_secs_f64();
            assert!((0.16..=0.24).contains(&d), "delay {} out of band", d);
        }
    }

    #[tokio::test]
    async fn test_verify_passes_without_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.zip");
        tokio::fs::write(&path, b"payload").await.unwrap();
        let asset = ReleaseAsset {
            url: "https://example.test/a.zip".to_string(),
            filename: "a.zip".to_string(),
            size: None,
            sha256: None,
        };
        verify_download(&path, &asset).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_detects_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.zip");
        tokio::fs::write(&path, b"payload").await.unwrap();
        let asset = ReleaseAsset {
            url: "https://example.test/a.zip".to_string(),
            filename: "a.zip".to_string(),
            size: Some(3),
            sha256: None,
        };
        let err = verify_download(&path, &asset).await.unwrap_err();
        assert!(matches!(err, DownloadError::Verification { .. }));
    }

    #[tokio::test]
    async fn test_verify_checksum_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.zip");
        tokio::fs::write(&path, b"payload").await.unwrap();
        let digest = {
            let mut h = Sha256::new();
            h.update(b"payload");
            hex::encode(h.finalize())
        };
        let asset = ReleaseAsset {
            url: "https://example.test/a.zip".to_string(),
            filename: "a.zip".to_string(),
            size: Some(7),
            sha256: Some(digest.to_ascii_uppercase()),
        };
        verify_download(&path, &asset).await.unwrap();
    }
}
