//! Sequential task pipeline
//!
//! Tasks run strictly in order over an immutable [`PipelineState`]. A task can
//! stop the run early by setting the interrupt flag. The cleanup task, when
//! registered, runs exactly once per `run` call whether the tasks succeeded,
//! were interrupted, or failed.

pub mod logger;
pub mod task;

use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

use crate::error::{IngestError, Result};
use crate::state::PipelineState;
pub use logger::{LogContext, PipelineLogger, TaskLogger, TracingLogger};
pub use task::{LogAware, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    NotStarted,
    Running,
    Completed,
    Interrupted,
    Failed,
}

/// Log plumbing for a single run
struct RunLog {
    logger: Option<Arc<dyn PipelineLogger>>,
    pipeline_id: String,
    source: String,
}

impl RunLog {
    fn context(&self, task: Option<&str>) -> LogContext {
        let context = LogContext::new()
            .with(logger::PIPELINE_ID, self.pipeline_id.as_str())
            .with(logger::SOURCE, self.source.as_str());
        match task {
            Some(task) => context.with(logger::TASK, task),
            None => context,
        }
    }

    fn event(&self, level: Level, message: &str, task: Option<&str>) {
        if let Some(logger) = &self.logger {
            logger.log(level, message, &self.context(task));
        }
    }

    fn inject(&self, task: &mut dyn Task) {
        let Some(logger) = &self.logger else {
            return;
        };
        let name = task.name().to_string();
        if let Some(aware) = task.as_log_aware() {
            aware.inject_logger(TaskLogger::new(logger.clone(), self.context(Some(&name))));
        }
    }
}

pub struct Pipeline {
    tasks: Vec<Box<dyn Task>>,
    cleanup: Option<Box<dyn Task>>,
    logger: Option<Arc<dyn PipelineLogger>>,
    source: String,
    status: PipelineStatus,
    last_run_id: Option<String>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cleanup: None,
            logger: None,
            source: "pipeline".to_string(),
            status: PipelineStatus::NotStarted,
            last_run_id: None,
        }
    }

    pub fn with_task(mut self, task: impl Task + 'static) -> Self {
        self.tasks.push(Box::new(task));
        self
    }

    pub fn with_boxed_task(mut self, task: Box<dyn Task>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_cleanup(mut self, task: impl Task + 'static) -> Self {
        self.cleanup = Some(Box::new(task));
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn PipelineLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Tag attached to every log event, e.g. `install` or `worker-2`
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn last_run_id(&self) -> Option<&str> {
        self.last_run_id.as_deref()
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    /// Run every task, then cleanup, returning the final state
    pub async fn run(&mut self, state: PipelineState) -> Result<PipelineState> {
        let log = RunLog {
            logger: self.logger.clone(),
            pipeline_id: Uuid::new_v4().to_string(),
            source: self.source.clone(),
        };
        self.last_run_id = Some(log.pipeline_id.clone());
        self.status = PipelineStatus::Running;
        log.event(Level::INFO, "Pipeline started", None);

        let mut current = state;
        for task in self.tasks.iter_mut() {
            let name = task.name().to_string();
            log.inject(task.as_mut());
            log.event(Level::DEBUG, "Task started", Some(&name));

            match task.run(current.clone()).await {
                Ok(next) => {
                    current = next;
                    log.event(Level::DEBUG, "Task finished", Some(&name));
                    if current.is_interrupted() {
                        self.status = PipelineStatus::Interrupted;
                        log.event(Level::INFO, "Pipeline interrupted", Some(&name));
                        break;
                    }
                },
                Err(cause) => {
                    self.status = PipelineStatus::Failed;
                    log.event(Level::ERROR, &format!("Task failed: {}", cause), Some(&name));
                    let failure = IngestError::pipeline(&name, cause);

                    let cleanup = Self::run_cleanup(&mut self.cleanup, &log, current).await;
                    if let Err((cleanup_task, cleanup_cause)) = cleanup {
                        log.event(Level::ERROR, "Cleanup failed after task failure", Some(&name));
                        return Err(IngestError::Pipeline {
                            message: format!("{} (after: {})", cleanup_cause, failure),
                            task: cleanup_task,
                            source: Box::new(cleanup_cause),
                        });
                    }
                    log.event(Level::INFO, "Pipeline stopped after failure", None);
                    return Err(failure);
                },
            }
        }

        match Self::run_cleanup(&mut self.cleanup, &log, current).await {
            Ok(final_state) => {
                if self.status == PipelineStatus::Running {
                    self.status = PipelineStatus::Completed;
                }
                log.event(Level::INFO, "Pipeline stopped", None);
                Ok(final_state)
            },
            Err((name, cause)) => {
                self.status = PipelineStatus::Failed;
                Err(IngestError::pipeline(name, cause))
            },
        }
    }

    /// Runs cleanup if registered; the error carries the cleanup task name
    async fn run_cleanup(
        cleanup: &mut Option<Box<dyn Task>>,
        log: &RunLog,
        state: PipelineState,
    ) -> std::result::Result<PipelineState, (String, IngestError)> {
        let Some(task) = cleanup.as_mut() else {
            return Ok(state);
        };

        let name = task.name().to_string();
        log.inject(task.as_mut());
        log.event(Level::DEBUG, "Cleanup started", Some(&name));

        match task.run(state).await {
            Ok(next) => {
                log.event(Level::DEBUG, "Cleanup finished", Some(&name));
                Ok(next)
            },
            Err(e) => {
                log.event(Level::ERROR, &format!("Cleanup failed: {}", e), Some(&name));
                Err((name, e))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::logger::tests::RecordingLogger;
    use super::*;
    use crate::state::ParamKey;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Counter(Arc<AtomicUsize>);

    impl Counter {
        fn get(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct CountingTask(Counter);

    #[async_trait]
    impl Task for CountingTask {
        async fn run(&self, state: PipelineState) -> Result<PipelineState> {
            let seen = self.0 .0.fetch_add(1, Ordering::SeqCst) as i64;
            Ok(state.with(ParamKey::FiasVersion, seen + 1))
        }
    }

    struct FailingTask(&'static str);

    #[async_trait]
    impl Task for FailingTask {
        async fn run(&self, _state: PipelineState) -> Result<PipelineState> {
            Err(IngestError::Internal(self.0.to_string()))
        }
    }

    struct InterruptingTask;

    #[async_trait]
    impl Task for InterruptingTask {
        async fn run(&self, state: PipelineState) -> Result<PipelineState> {
            Ok(state.interrupt())
        }
    }

    #[derive(Default)]
    struct ChattyTask {
        logger: TaskLogger,
    }

    #[async_trait]
    impl Task for ChattyTask {
        async fn run(&self, state: PipelineState) -> Result<PipelineState> {
            self.logger.info("hello from task");
            Ok(state)
        }

        fn as_log_aware(&mut self) -> Option<&mut dyn LogAware> {
            Some(self)
        }
    }

    impl LogAware for ChattyTask {
        fn inject_logger(&mut self, logger: TaskLogger) {
            self.logger = logger;
        }
    }

    #[tokio::test]
    async fn test_cleanup_runs_once_whichever_task_fails() {
        for failing in 0..3 {
            let (ran, cleaned) = (Counter::default(), Counter::default());
            let mut pipeline = Pipeline::new();
            for index in 0..3 {
                pipeline = if index == failing {
                    pipeline.with_task(FailingTask("boom"))
                } else {
                    pipeline.with_task(CountingTask(ran.clone()))
                };
            }
            let mut pipeline = pipeline.with_cleanup(CountingTask(cleaned.clone()));

            let err = pipeline.run(PipelineState::new()).await.unwrap_err();

            assert!(err.to_string().contains("boom"));
            assert!(matches!(err, IngestError::Pipeline { ref task, .. } if task == "FailingTask"));
            assert_eq!(cleaned.get(), 1);
            assert_eq!(ran.get(), failing);
            assert_eq!(pipeline.status(), PipelineStatus::Failed);
        }
    }

    #[tokio::test]
    async fn test_interrupt_stops_remaining_tasks() {
        let (ran, cleaned) = (Counter::default(), Counter::default());
        let mut pipeline = Pipeline::new()
            .with_task(CountingTask(ran.clone()))
            .with_task(InterruptingTask)
            .with_task(CountingTask(ran.clone()))
            .with_cleanup(CountingTask(cleaned.clone()));

        let state = pipeline.run(PipelineState::new()).await.unwrap();

        assert_eq!(ran.get(), 1);
        assert_eq!(cleaned.get(), 1);
        assert!(state.is_interrupted());
        assert_eq!(pipeline.status(), PipelineStatus::Interrupted);
    }

    #[tokio::test]
    async fn test_success_threads_state_and_completes() {
        let ran = Counter::default();
        let mut pipeline = Pipeline::new()
            .with_task(CountingTask(ran.clone()))
            .with_task(CountingTask(ran.clone()));
        assert_eq!(pipeline.status(), PipelineStatus::NotStarted);

        let state = pipeline.run(PipelineState::new()).await.unwrap();

        assert_eq!(state.int(ParamKey::FiasVersion), Some(2));
        assert_eq!(pipeline.status(), PipelineStatus::Completed);
    }

    #[tokio::test]
    async fn test_cleanup_error_is_not_swallowed() {
        let mut on_success = Pipeline::new()
            .with_task(CountingTask(Counter::default()))
            .with_cleanup(FailingTask("disk full"));
        let err = on_success.run(PipelineState::new()).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));

        let mut on_failure = Pipeline::new()
            .with_task(FailingTask("boom"))
            .with_cleanup(FailingTask("disk full"));
        let message = on_failure.run(PipelineState::new()).await.unwrap_err().to_string();
        assert!(message.contains("disk full"));
        assert!(message.contains("boom"));
    }

    #[tokio::test]
    async fn test_logger_events_share_pipeline_id() {
        let recorder = Arc::new(RecordingLogger::default());
        let mut pipeline = Pipeline::new()
            .with_task(ChattyTask::default())
            .with_source("install")
            .with_logger(recorder.clone());

        pipeline.run(PipelineState::new()).await.unwrap();

        let events = recorder.events.lock().unwrap();
        let run_id = pipeline.last_run_id().unwrap();
        assert!(events.iter().all(|(_, _, ctx)| ctx.get_str(logger::PIPELINE_ID) == Some(run_id)));
        assert!(events.iter().all(|(_, _, ctx)| ctx.get_str(logger::SOURCE) == Some("install")));

        let from_task = events
            .iter()
            .find(|(_, message, _)| message == "hello from task")
            .unwrap();
        assert_eq!(from_task.2.get_str(logger::TASK), Some("ChattyTask"));
        assert_eq!(events.first().unwrap().1, "Pipeline started");
        assert_eq!(events.last().unwrap().1, "Pipeline stopped");
    }

    #[tokio::test]
    async fn test_runs_without_logger() {
        let mut pipeline = Pipeline::new().with_task(ChattyTask::default());
        assert!(pipeline.run(PipelineState::new()).await.is_ok());
    }
}
