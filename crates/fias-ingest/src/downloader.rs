//! Retrying HTTP download with byte-range resume
//!
//! Each attempt holds an exclusive advisory lock on the target file. When the
//! server advertises `Accept-Ranges: bytes` and a previous attempt left a
//! partial file behind, the next attempt appends the missing tail instead of
//! starting over.

use fias_common::checksum::verify_file_checksum;
use fias_common::types::{validate_http_url, ChecksumAlgorithm};
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::http::{ByteRange, HttpResponse, HttpTransport};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// What HEAD told us about the remote file
#[derive(Debug, Clone, Copy, Default)]
struct RemoteProbe {
    content_length: Option<u64>,
    supports_ranges: bool,
}

/// Exclusive lock on the download target, released on drop
struct LockedTarget {
    file: File,
}

impl LockedTarget {
    fn acquire(path: &Path, append: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .open(path)?;

        match file.try_lock() {
            Ok(()) => {},
            Err(TryLockError::WouldBlock) => {
                return Err(IngestError::Internal(format!(
                    "{} is locked by another download",
                    path.display()
                )))
            },
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        // Truncate only once the lock is ours
        if !append {
            file.set_len(0)?;
        }
        Ok(Self { file })
    }

    fn writer(&self) -> Result<tokio::fs::File> {
        Ok(tokio::fs::File::from_std(self.file.try_clone()?))
    }
}

impl Drop for LockedTarget {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(error = %e, "Failed to release download lock");
        }
    }
}

enum AttemptOutcome {
    Finished,
    BadStatus(u16),
    /// Server answered a range request with the whole body
    RangeIgnored,
    Failed(IngestError),
}

pub struct ResumableDownloader {
    transport: Arc<dyn HttpTransport>,
    config: DownloaderConfig,
}

impl ResumableDownloader {
    pub fn new(transport: Arc<dyn HttpTransport>, config: DownloaderConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Download `url` into `target`, retrying and resuming as needed
    pub async fn download(&self, url: &str, target: &Path) -> Result<()> {
        validate_http_url(url).map_err(|e| IngestError::Config(e.to_string()))?;
        if target.as_os_str().is_empty() {
            return Err(IngestError::Config("download target path is empty".to_string()));
        }
        if self.config.max_attempts == 0 {
            return Err(IngestError::Config(
                "download max_attempts must be at least 1".to_string(),
            ));
        }

        let probe = self.probe(url).await;
        let mut supports_ranges = probe.supports_ranges;
        let mut last_status: Option<u16> = None;
        let mut last_error: Option<IngestError> = None;

        info!(
            url = %url,
            target = %target.display(),
            content_length = ?probe.content_length,
            supports_ranges,
            "Starting download"
        );

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 && !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            let range = if attempt > 1 && supports_ranges {
                resume_range(target, probe.content_length).await
            } else {
                None
            };

            match self.attempt(url, target, range, probe.content_length).await {
                AttemptOutcome::Finished => {
                    info!(url = %url, attempt, "Download finished");
                    return Ok(());
                },
                AttemptOutcome::BadStatus(status) => {
                    warn!(url = %url, attempt, status, "Download attempt got bad status");
                    last_status = Some(status);
                    last_error = None;
                },
                AttemptOutcome::RangeIgnored => {
                    warn!(url = %url, attempt, "Server ignored range request, restarting from zero");
                    supports_ranges = false;
                    last_status = None;
                    last_error = Some(IngestError::transport(
                        url,
                        "server answered a range request with the full body",
                    ));
                },
                AttemptOutcome::Failed(e) => {
                    warn!(url = %url, attempt, error = %e, "Download attempt failed");
                    last_status = None;
                    last_error = Some(e);
                },
            }
        }

        let attempts = self.config.max_attempts;
        Err(match (last_status, last_error) {
            (Some(status), _) => IngestError::BadStatus {
                url: url.to_string(),
                attempts,
                status,
            },
            (None, Some(cause)) => IngestError::Download {
                url: url.to_string(),
                attempts,
                source: Box::new(cause),
            },
            (None, None) => IngestError::Internal(format!("download of {} made no attempts", url)),
        })
    }

    /// Download and check the SHA-256 digest of the finished file
    pub async fn download_verified(&self, url: &str, target: &Path, sha256: &str) -> Result<()> {
        self.download(url, target).await?;

        let path: PathBuf = target.to_path_buf();
        let expected = sha256.to_string();
        tokio::task::spawn_blocking(move || {
            verify_file_checksum(&path, &expected, ChecksumAlgorithm::Sha256)
        })
        .await
        .map_err(|e| IngestError::Internal(format!("checksum task failed: {}", e)))??;

        debug!(target = %target.display(), "Checksum verified");
        Ok(())
    }

    /// HEAD failures only cost us resume support
    async fn probe(&self, url: &str) -> RemoteProbe {
        match self.transport.head(url).await {
            Ok(response) if response.is_ok() => RemoteProbe {
                content_length: response.content_length(),
                supports_ranges: response.supports_ranges(),
            },
            Ok(response) => {
                debug!(url = %url, status = response.status(), "HEAD returned non-2xx status");
                RemoteProbe::default()
            },
            Err(e) => {
                debug!(url = %url, error = %e, "HEAD request failed");
                RemoteProbe::default()
            },
        }
    }

    async fn attempt(
        &self,
        url: &str,
        target: &Path,
        range: Option<ByteRange>,
        content_length: Option<u64>,
    ) -> AttemptOutcome {
        let lock = match LockedTarget::acquire(target, range.is_some()) {
            Ok(lock) => lock,
            Err(e) => return AttemptOutcome::Failed(e),
        };
        let mut writer = match lock.writer() {
            Ok(writer) => writer,
            Err(e) => return AttemptOutcome::Failed(e),
        };

        if let Some(range) = range {
            debug!(url = %url, range = %range.header_value(), "Resuming download");
        }

        let result = self.transport.download(url, &mut writer, range).await;
        let flushed = writer.flush().await;
        drop(writer);

        let response: HttpResponse = match (result, flushed) {
            (Err(e), _) => return AttemptOutcome::Failed(e),
            (Ok(_), Err(e)) => return AttemptOutcome::Failed(e.into()),
            (Ok(response), Ok(())) => response,
        };

        if !response.is_ok() {
            return AttemptOutcome::BadStatus(response.status());
        }
        if range.is_some() && response.status() == 200 {
            return AttemptOutcome::RangeIgnored;
        }

        if let Some(expected) = content_length {
            match tokio::fs::metadata(target).await {
                Ok(meta) if meta.len() == expected => {},
                Ok(meta) => {
                    return AttemptOutcome::Failed(IngestError::transport(
                        url,
                        format!("received {} of {} bytes", meta.len(), expected),
                    ))
                },
                Err(e) => return AttemptOutcome::Failed(e.into()),
            }
        }

        drop(lock);
        AttemptOutcome::Finished
    }
}

/// Range still missing from a partial file, if resuming makes sense
async fn resume_range(target: &Path, content_length: Option<u64>) -> Option<ByteRange> {
    let length = content_length?;
    let current = tokio::fs::metadata(target).await.ok()?.len();
    if current == 0 || current >= length {
        return None;
    }
    Some(ByteRange::new(current, Some(length - 1)))
}
