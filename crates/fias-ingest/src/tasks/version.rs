use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::pipeline::Task;
use crate::state::{ParamKey, PipelineState};
use crate::version_storage::VersionStorage;

/// Records the processed version once all workers succeeded
pub struct SaveVersionTask {
    storage: Arc<dyn VersionStorage>,
}

impl SaveVersionTask {
    pub fn new(storage: Arc<dyn VersionStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Task for SaveVersionTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        let version = state.require_int(ParamKey::FiasVersion)?;
        self.storage.save(version, state.update_mode()).await?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpdateMode;
    use crate::version_storage::JsonFileVersionStorage;

    #[tokio::test]
    async fn test_saves_state_version() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonFileVersionStorage::new(dir.path().join("v.json")));
        let state = PipelineState::new()
            .with(ParamKey::FiasVersion, 20240105_i64)
            .with(ParamKey::UpdateMode, UpdateMode::Install);

        SaveVersionTask::new(storage.clone()).run(state).await.unwrap();

        assert_eq!(storage.current().await.unwrap().unwrap().version, 20240105);
    }
}
