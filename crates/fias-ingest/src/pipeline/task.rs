use async_trait::async_trait;

use super::logger::TaskLogger;
use crate::error::Result;
use crate::state::PipelineState;

/// One step of a pipeline.
///
/// Tasks receive the current state and return the next one. Anything a task
/// needs between runs lives in its collaborators, not in `self`.
#[async_trait]
pub trait Task: Send + Sync {
    /// Identifier used in log events and error messages
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    async fn run(&self, state: PipelineState) -> Result<PipelineState>;

    /// Tasks that emit their own log events return themselves here
    fn as_log_aware(&mut self) -> Option<&mut dyn LogAware> {
        None
    }
}

/// `crate::tasks::Retry<crate::tasks::Download>` gives `Retry`
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Capability for tasks that want the pipeline's logger
pub trait LogAware {
    fn inject_logger(&mut self, logger: TaskLogger);
}
