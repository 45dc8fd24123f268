use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::error::{IngestError, Result};
use crate::informer::VersionInformer;
use crate::models::UpdateMode;
use crate::pipeline::Task;
use crate::state::{ParamKey, PipelineState};
use crate::version_storage::VersionStorage;

/// Resolves the newest full distribution
pub struct InformFullTask {
    informer: Arc<dyn VersionInformer>,
}

impl InformFullTask {
    pub fn new(informer: Arc<dyn VersionInformer>) -> Self {
        Self { informer }
    }
}

#[async_trait]
impl Task for InformFullTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        let info = self.informer.latest().await?;
        Ok(state
            .with(ParamKey::FiasVersion, info.version())
            .with(ParamKey::UpdateMode, UpdateMode::Install)
            .with(ParamKey::RemoteSourceInfo, info))
    }
}

/// Resolves the delta following the installed version.
/// Interrupts the pipeline when nothing newer is published.
pub struct InformDeltaTask {
    informer: Arc<dyn VersionInformer>,
    storage: Arc<dyn VersionStorage>,
}

impl InformDeltaTask {
    pub fn new(informer: Arc<dyn VersionInformer>, storage: Arc<dyn VersionStorage>) -> Self {
        Self { informer, storage }
    }
}

#[async_trait]
impl Task for InformDeltaTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        let installed = self.storage.current().await?.ok_or_else(|| {
            IngestError::State("no installed version found, run a full install first".to_string())
        })?;

        match self.informer.next_after(installed.version).await? {
            Some(info) => Ok(state
                .with(ParamKey::FiasVersion, info.version())
                .with(ParamKey::UpdateMode, UpdateMode::Update)
                .with(ParamKey::RemoteSourceInfo, info)),
            None => {
                info!(installed = installed.version, "Installed version is up to date");
                Ok(state.interrupt())
            },
        }
    }
}
