//! Remote registry service: version discovery and availability checks

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::http::HttpTransport;
use crate::models::RemoteVersionInfo;

/// Public endpoint listing every published distribution
pub const DEFAULT_INFORMER_URL: &str =
    "https://fias.nalog.ru/WebServices/Public/GetAllDownloadFileInfo";

#[async_trait]
pub trait VersionInformer: Send + Sync {
    /// Newest version that has a full archive
    async fn latest(&self) -> Result<RemoteVersionInfo>;

    /// Oldest version newer than `version` that has a delta archive
    async fn next_after(&self, version: i64) -> Result<Option<RemoteVersionInfo>>;
}

/// One element of the service's JSON listing
#[derive(Debug, Deserialize)]
struct DownloadFileInfo {
    #[serde(rename = "VersionId")]
    version_id: i64,
    #[serde(rename = "GarXMLFullURL", default)]
    full_url: Option<String>,
    #[serde(rename = "GarXMLDeltaURL", default)]
    delta_url: Option<String>,
}

pub struct HttpVersionInformer {
    transport: Arc<dyn HttpTransport>,
    url: String,
}

impl HttpVersionInformer {
    pub fn new(transport: Arc<dyn HttpTransport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }

    /// Valid entries sorted by ascending version
    async fn fetch(&self) -> Result<Vec<RemoteVersionInfo>> {
        let response = self.transport.get(&self.url).await?;
        if !response.is_ok() {
            return Err(IngestError::Remote(format!(
                "{} answered with status {}",
                self.url,
                response.status()
            )));
        }

        let listing: Vec<DownloadFileInfo> = response.json()?;
        let mut versions: Vec<RemoteVersionInfo> = listing
            .into_iter()
            .filter_map(|item| {
                match RemoteVersionInfo::new(item.version_id, item.full_url, item.delta_url) {
                    Ok(info) => Some(info),
                    Err(e) => {
                        debug!(version = item.version_id, error = %e, "Skipping invalid version entry");
                        None
                    },
                }
            })
            .collect();
        versions.sort_by_key(RemoteVersionInfo::version);
        Ok(versions)
    }
}

#[async_trait]
impl VersionInformer for HttpVersionInformer {
    async fn latest(&self) -> Result<RemoteVersionInfo> {
        let latest = self
            .fetch()
            .await?
            .into_iter()
            .rev()
            .find(|v| v.full_url().is_some())
            .ok_or_else(|| IngestError::Remote("no version with a full archive is published".to_string()))?;

        info!(version = latest.version(), "Latest full version resolved");
        Ok(latest)
    }

    async fn next_after(&self, version: i64) -> Result<Option<RemoteVersionInfo>> {
        let next = self
            .fetch()
            .await?
            .into_iter()
            .find(|v| v.version() > version && v.delta_url().is_some());

        debug!(installed = version, next = ?next.as_ref().map(RemoteVersionInfo::version), "Next delta resolved");
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Available,
    Unavailable(String),
}

impl ServiceStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, ServiceStatus::Available)
    }
}

#[async_trait]
pub trait StatusChecker: Send + Sync {
    async fn check(&self) -> ServiceStatus;
}

/// Considers the service up when `url` answers a GET with 2xx
pub struct HttpStatusChecker {
    transport: Arc<dyn HttpTransport>,
    url: String,
}

impl HttpStatusChecker {
    pub fn new(transport: Arc<dyn HttpTransport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl StatusChecker for HttpStatusChecker {
    async fn check(&self) -> ServiceStatus {
        match self.transport.get(&self.url).await {
            Ok(response) if response.is_ok() => ServiceStatus::Available,
            Ok(response) => ServiceStatus::Unavailable(format!(
                "{} answered with status {}",
                self.url,
                response.status()
            )),
            Err(e) => ServiceStatus::Unavailable(e.to_string()),
        }
    }
}
