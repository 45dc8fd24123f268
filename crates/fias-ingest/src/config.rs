//! Loader configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::downloader::DownloaderConfig;
use crate::informer::DEFAULT_INFORMER_URL;

// ============================================================================
// Loader Configuration Constants
// ============================================================================

/// Default folder for downloads, extraction and the version file.
pub const DEFAULT_WORK_DIR: &str = "./fias-data";

/// Default number of worker processes.
pub const DEFAULT_WORKER_COUNT: i64 = 4;

/// Default download attempts before giving up.
pub const DEFAULT_DOWNLOAD_MAX_ATTEMPTS: u32 = 10;

/// Default pause between download attempts in seconds.
pub const DEFAULT_DOWNLOAD_RETRY_DELAY_SECS: u64 = 10;

/// Default HTTP timeout in seconds (full archives are tens of gigabytes).
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 6 * 60 * 60;

/// Default interval between worker status polls in milliseconds.
pub const DEFAULT_WORKER_POLL_INTERVAL_MS: u64 = 1000;

/// Version file name inside the work directory.
pub const DEFAULT_VERSION_FILE_NAME: &str = "version.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub informer_url: String,
    pub work_dir: PathBuf,
    pub worker_count: i64,
    pub download_max_attempts: u32,
    pub download_retry_delay_secs: u64,
    pub http_timeout_secs: u64,
    pub worker_poll_interval_ms: u64,
    /// JSON entity registry; the built-in registry is used when unset
    pub entity_registry: Option<PathBuf>,
    pub version_file: PathBuf,
    /// Extract the whole archive and select from disk instead of the archive listing
    pub extract_before_select: bool,
    pub keep_downloads: bool,
    /// Restrict the run to these GAR tables; empty means all bound tables
    pub tables: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let work_dir = PathBuf::from(DEFAULT_WORK_DIR);
        Self {
            informer_url: DEFAULT_INFORMER_URL.to_string(),
            version_file: work_dir.join(DEFAULT_VERSION_FILE_NAME),
            work_dir,
            worker_count: DEFAULT_WORKER_COUNT,
            download_max_attempts: DEFAULT_DOWNLOAD_MAX_ATTEMPTS,
            download_retry_delay_secs: DEFAULT_DOWNLOAD_RETRY_DELAY_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            worker_poll_interval_ms: DEFAULT_WORKER_POLL_INTERVAL_MS,
            entity_registry: None,
            extract_before_select: false,
            keep_downloads: false,
            tables: Vec::new(),
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

impl IngestConfig {
    /// Load configuration from `.env`, `FIAS_*` environment variables and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Build from an arbitrary key lookup; unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let work_dir = lookup("FIAS_WORK_DIR").map(PathBuf::from).unwrap_or(defaults.work_dir);

        Self {
            informer_url: lookup("FIAS_INFORMER_URL").unwrap_or(defaults.informer_url),
            version_file: lookup("FIAS_VERSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| work_dir.join(DEFAULT_VERSION_FILE_NAME)),
            work_dir,
            worker_count: parsed(&lookup, "FIAS_WORKER_COUNT", defaults.worker_count),
            download_max_attempts: parsed(
                &lookup,
                "FIAS_DOWNLOAD_MAX_ATTEMPTS",
                defaults.download_max_attempts,
            ),
            download_retry_delay_secs: parsed(
                &lookup,
                "FIAS_DOWNLOAD_RETRY_DELAY",
                defaults.download_retry_delay_secs,
            ),
            http_timeout_secs: parsed(&lookup, "FIAS_HTTP_TIMEOUT", defaults.http_timeout_secs),
            worker_poll_interval_ms: parsed(
                &lookup,
                "FIAS_WORKER_POLL_INTERVAL_MS",
                defaults.worker_poll_interval_ms,
            ),
            entity_registry: lookup("FIAS_ENTITY_REGISTRY")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            extract_before_select: parsed(&lookup, "FIAS_EXTRACT_BEFORE_SELECT", false),
            keep_downloads: parsed(&lookup, "FIAS_KEEP_DOWNLOADS", false),
            tables: lookup("FIAS_TABLES")
                .map(|s| {
                    s.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_count <= 0 {
            anyhow::bail!("Worker count must be greater than 0");
        }

        if self.download_max_attempts == 0 {
            anyhow::bail!("Download max attempts must be greater than 0");
        }

        if self.http_timeout_secs == 0 {
            anyhow::bail!("HTTP timeout must be greater than 0");
        }

        if self.work_dir.as_os_str().is_empty() {
            anyhow::bail!("Work directory cannot be empty");
        }

        fias_common::types::validate_http_url(&self.informer_url)?;

        Ok(())
    }

    pub fn downloader_config(&self) -> DownloaderConfig {
        DownloaderConfig {
            max_attempts: self.download_max_attempts,
            retry_delay: Duration::from_secs(self.download_retry_delay_secs),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> IngestConfig {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        IngestConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = from_map(&[]);
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_count, DEFAULT_WORKER_COUNT);
        assert_eq!(config.version_file, PathBuf::from(DEFAULT_WORK_DIR).join("version.json"));
        assert_eq!(config.downloader_config().max_attempts, 10);
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("FIAS_WORK_DIR", "/var/lib/fias"),
            ("FIAS_WORKER_COUNT", "8"),
            ("FIAS_DOWNLOAD_RETRY_DELAY", "0"),
            ("FIAS_TABLES", "houses, addr_obj,,"),
            ("FIAS_KEEP_DOWNLOADS", "true"),
            ("FIAS_HTTP_TIMEOUT", "not-a-number"),
        ]);

        assert_eq!(config.work_dir, PathBuf::from("/var/lib/fias"));
        assert_eq!(config.version_file, PathBuf::from("/var/lib/fias/version.json"));
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.downloader_config().retry_delay, Duration::ZERO);
        assert_eq!(config.tables, vec!["houses", "addr_obj"]);
        assert!(config.keep_downloads);
        assert_eq!(config.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS);
    }

    #[test]
    fn test_validation_failures() {
        assert!(from_map(&[("FIAS_WORKER_COUNT", "0")]).validate().is_err());
        assert!(from_map(&[("FIAS_WORKER_COUNT", "-2")]).validate().is_err());
        assert!(from_map(&[("FIAS_DOWNLOAD_MAX_ATTEMPTS", "0")]).validate().is_err());
        assert!(from_map(&[("FIAS_INFORMER_URL", "ftp://fias")]).validate().is_err());
    }
}
