use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::informer::{ServiceStatus, StatusChecker};
use crate::pipeline::Task;
use crate::state::PipelineState;

/// Fails the run early when the registry service is down
pub struct StatusCheckTask {
    checker: Arc<dyn StatusChecker>,
}

impl StatusCheckTask {
    pub fn new(checker: Arc<dyn StatusChecker>) -> Self {
        Self { checker }
    }
}

#[async_trait]
impl Task for StatusCheckTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        match self.checker.check().await {
            ServiceStatus::Available => {
                debug!("Registry service is available");
                Ok(state)
            },
            ServiceStatus::Unavailable(reason) => Err(IngestError::Remote(format!(
                "registry service is unavailable: {}",
                reason
            ))),
        }
    }
}
