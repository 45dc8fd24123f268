use async_trait::async_trait;
use std::sync::Arc;
use tracing::Level;

use crate::error::Result;
use crate::pipeline::{LogAware, LogContext, Task, TaskLogger};
use crate::planner::ThreadPlanner;
use crate::runner::ThreadRunner;
use crate::state::{ParamKey, PipelineState};

/// Plans the selected files and runs one worker process per group.
///
/// Each worker state is the current state with its own `FilesToProcess`
/// and `WorkerIndex`.
pub struct DistributeTask {
    planner: ThreadPlanner,
    runner: ThreadRunner,
    worker_count: i64,
    logger: TaskLogger,
}

impl DistributeTask {
    pub fn new(planner: ThreadPlanner, runner: ThreadRunner, worker_count: i64) -> Self {
        Self {
            planner,
            runner,
            worker_count,
            logger: TaskLogger::default(),
        }
    }
}

#[async_trait]
impl Task for DistributeTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        if state.files(ParamKey::FilesToProcess).is_empty() {
            self.logger.info("No files to distribute");
            return Ok(state);
        }

        let groups = self
            .planner
            .plan(state.files(ParamKey::FilesToProcess), self.worker_count)?;

        let worker_states: Vec<PipelineState> = groups
            .into_iter()
            .enumerate()
            .map(|(index, files)| {
                self.logger.log(
                    Level::INFO,
                    "Planned worker",
                    LogContext::new()
                        .with("worker", index)
                        .with("files", files.len())
                        .with("bytes", files.iter().map(|f| f.size()).sum::<u64>()),
                );
                state
                    .with(ParamKey::FilesToProcess, files)
                    .with(ParamKey::WorkerIndex, index as i64)
            })
            .collect();

        self.runner.run(worker_states).await?;
        Ok(state)
    }

    fn as_log_aware(&mut self) -> Option<&mut dyn LogAware> {
        Some(self)
    }
}

impl LogAware for DistributeTask {
    fn inject_logger(&mut self, logger: TaskLogger) {
        self.logger = logger;
    }
}
