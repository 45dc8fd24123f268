use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::error::{IngestError, Result};
use crate::pipeline::Task;
use crate::selector::FileSelector;
use crate::state::{ParamKey, PipelineState};

/// Selects files from the path stored under `source` into `FilesToProcess`.
///
/// An empty selection is not an interruption: a delta without registry files
/// still has to be recorded as applied.
pub struct SelectFilesTask {
    selector: Arc<dyn FileSelector>,
    source: ParamKey,
}

impl SelectFilesTask {
    pub fn new(selector: Arc<dyn FileSelector>, source: ParamKey) -> Self {
        Self { selector, source }
    }
}

#[async_trait]
impl Task for SelectFilesTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        let source = state.require_path(self.source)?.to_path_buf();
        let selector = self.selector.clone();
        let files = tokio::task::spawn_blocking(move || selector.select_files(&source))
            .await
            .map_err(|e| IngestError::Internal(format!("file selection task failed: {}", e)))??;

        if files.is_empty() {
            info!("No registry files selected");
        }

        let bytes: u64 = files.iter().map(|f| f.size()).sum();
        info!(files = files.len(), bytes, "Selected files for processing");
        Ok(state.with(ParamKey::FilesToProcess, files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::RegistryEntityManager;
    use crate::models::SelectedFile;
    use crate::selector::{DirectorySelector, EntityFileMatcher};

    fn task() -> SelectFilesTask {
        let registry = RegistryEntityManager::builtin().unwrap();
        let selector = DirectorySelector::new(EntityFileMatcher::new(Arc::new(registry)));
        SelectFilesTask::new(Arc::new(selector), ParamKey::ExtractToFolder)
    }

    #[tokio::test]
    async fn test_selection_lands_in_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("AS_HOUSES_20240105_ab12.XML"), b"<HOUSES/>").unwrap();
        let state = PipelineState::new().with(ParamKey::ExtractToFolder, dir.path());

        let state = task().run(state).await.unwrap();

        assert!(!state.is_interrupted());
        assert_eq!(state.files(ParamKey::FilesToProcess).len(), 1);
    }

    #[tokio::test]
    async fn test_empty_selection_continues() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"hi").unwrap();
        let state = PipelineState::new()
            .with(ParamKey::ExtractToFolder, dir.path())
            .with(ParamKey::FilesToProcess, vec![SelectedFile::new("stale.XML", 1, None).unwrap()]);

        let state = task().run(state).await.unwrap();

        assert!(!state.is_interrupted());
        assert!(state.files(ParamKey::FilesToProcess).is_empty());
    }
}
