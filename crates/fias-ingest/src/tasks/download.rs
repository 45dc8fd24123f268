use async_trait::async_trait;
use std::sync::Arc;

use crate::downloader::ResumableDownloader;
use crate::error::{IngestError, Result};
use crate::pipeline::{LogAware, Task, TaskLogger};
use crate::state::{ParamKey, PipelineState};

/// Downloads the archive for the run's update mode
pub struct DownloadTask {
    downloader: Arc<ResumableDownloader>,
    logger: TaskLogger,
}

impl DownloadTask {
    pub fn new(downloader: Arc<ResumableDownloader>) -> Self {
        Self {
            downloader,
            logger: TaskLogger::default(),
        }
    }
}

#[async_trait]
impl Task for DownloadTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        let mode = state.update_mode();
        let info = state.require_remote_info()?;
        let url = info.url_for(mode).ok_or_else(|| {
            IngestError::Config(format!(
                "version {} has no {} archive URL",
                info.version(),
                mode.as_str()
            ))
        })?;
        let target = state.require_path(ParamKey::DownloadTargetFile)?;

        self.logger.info(&format!("Downloading {} to {}", url, target.display()));
        self.downloader.download(url, target).await?;
        self.logger.info("Download complete");

        Ok(state)
    }

    fn as_log_aware(&mut self) -> Option<&mut dyn LogAware> {
        Some(self)
    }
}

impl LogAware for DownloadTask {
    fn inject_logger(&mut self, logger: TaskLogger) {
        self.logger = logger;
    }
}
