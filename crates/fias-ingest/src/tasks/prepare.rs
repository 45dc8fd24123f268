use async_trait::async_trait;
use fias_common::types::validate_http_url;
use std::path::PathBuf;
use tracing::info;

use crate::error::{IngestError, Result};
use crate::pipeline::Task;
use crate::state::{ParamKey, PipelineState};

const DEFAULT_ARCHIVE_NAME: &str = "archive.zip";

/// Lays out `<work_dir>/<mode>_<version>/` for the download and extraction
pub struct PrepareFolderTask {
    work_dir: PathBuf,
}

impl PrepareFolderTask {
    pub fn new(work_dir: impl Into<PathBuf>) -> Result<Self> {
        let work_dir = work_dir.into();
        if work_dir.as_os_str().is_empty() {
            return Err(IngestError::Config("work directory is empty".to_string()));
        }
        Ok(Self { work_dir })
    }
}

/// Last path segment of the URL, when it looks like a file name
fn archive_name(url: &str) -> String {
    validate_http_url(url)
        .ok()
        .and_then(|u| u.path_segments()?.next_back().map(str::to_string))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string())
}

#[async_trait]
impl Task for PrepareFolderTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        let version = state.require_int(ParamKey::FiasVersion)?;
        let mode = state.update_mode();
        let info = state.require_remote_info()?;
        let url = info.url_for(mode).ok_or_else(|| {
            IngestError::Config(format!(
                "version {} has no {} archive URL",
                version,
                mode.as_str()
            ))
        })?;

        let folder = self.work_dir.join(format!("{}_{}", mode.as_str(), version));
        let extract = folder.join("extracted");
        tokio::fs::create_dir_all(&extract).await?;

        let target = folder.join(archive_name(url));
        info!(folder = %folder.display(), "Prepared work folder");

        Ok(state
            .with(ParamKey::DownloadTargetFile, target)
            .with(ParamKey::ExtractToFolder, extract))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RemoteVersionInfo, UpdateMode};

    #[tokio::test]
    async fn test_prepares_versioned_folder() {
        let dir = tempfile::tempdir().unwrap();
        let info = RemoteVersionInfo::new(
            20240105,
            Some("https://fias-file.nalog.ru/downloads/2024.01.05/gar_xml.zip".into()),
            None,
        )
        .unwrap();
        let state = PipelineState::new()
            .with(ParamKey::FiasVersion, 20240105_i64)
            .with(ParamKey::UpdateMode, UpdateMode::Install)
            .with(ParamKey::RemoteSourceInfo, info);

        let state = PrepareFolderTask::new(dir.path()).unwrap().run(state).await.unwrap();

        let folder = dir.path().join("install_20240105");
        assert_eq!(state.path(ParamKey::DownloadTargetFile), Some(folder.join("gar_xml.zip").as_path()));
        assert!(folder.join("extracted").is_dir());
    }

    #[tokio::test]
    async fn test_missing_url_for_mode_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let info = RemoteVersionInfo::new(7, Some("https://h/full.zip".into()), None).unwrap();
        let state = PipelineState::new()
            .with(ParamKey::FiasVersion, 7_i64)
            .with(ParamKey::UpdateMode, UpdateMode::Update)
            .with(ParamKey::RemoteSourceInfo, info);

        let err = PrepareFolderTask::new(dir.path()).unwrap().run(state).await.unwrap_err();
        assert!(err.is_config());
        assert_eq!(archive_name("https://h/"), "archive.zip");
    }
}
