use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::pipeline::Task;
use crate::state::{ParamKey, PipelineState};

/// Removes the extraction folder and, unless told to keep it, the archive
pub struct CleanupTask {
    remove_download: bool,
}

impl CleanupTask {
    pub fn new(remove_download: bool) -> Self {
        Self { remove_download }
    }
}

async fn remove_path(path: &Path) -> Result<()> {
    let result = if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => {
            debug!(path = %path.display(), "Removed");
            Ok(())
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Task for CleanupTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        if let Some(folder) = state.path(ParamKey::ExtractToFolder) {
            remove_path(folder).await?;
        }
        if self.remove_download {
            if let Some(archive) = state.path(ParamKey::DownloadTargetFile) {
                remove_path(archive).await?;
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_removes_extraction_and_optionally_download() {
        let dir = tempfile::tempdir().unwrap();
        let extract = dir.path().join("extracted");
        std::fs::create_dir_all(extract.join("01")).unwrap();
        std::fs::write(extract.join("01/a.XML"), b"x").unwrap();
        let archive = dir.path().join("gar.zip");
        std::fs::write(&archive, b"zip").unwrap();
        let state = PipelineState::new()
            .with(ParamKey::ExtractToFolder, extract.clone())
            .with(ParamKey::DownloadTargetFile, archive.clone());

        CleanupTask::new(false).run(state.clone()).await.unwrap();
        assert!(!extract.exists());
        assert!(archive.exists());

        CleanupTask::new(true).run(state).await.unwrap();
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_missing_paths_are_fine() {
        let state = PipelineState::new().with(ParamKey::ExtractToFolder, Path::new("/nonexistent/fias"));
        assert!(CleanupTask::new(true).run(state).await.is_ok());
    }
}
