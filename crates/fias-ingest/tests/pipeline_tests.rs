//! Pipeline engine behaviour seen from outside the crate
//!
//! These tests verify:
//! - A failing task is wrapped and cleanup still runs once
//! - Interruption skips the remaining tasks
//! - Task order and state hand-off

use async_trait::async_trait;
use fias_ingest::{IngestError, ParamKey, Pipeline, PipelineState, PipelineStatus, Result, Task};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Adds one to `FiasVersion`
struct Increment;

#[async_trait]
impl Task for Increment {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        let next = state.int(ParamKey::FiasVersion).unwrap_or(0) + 1;
        Ok(state.with(ParamKey::FiasVersion, next))
    }
}

struct Boom;

#[async_trait]
impl Task for Boom {
    async fn run(&self, _state: PipelineState) -> Result<PipelineState> {
        Err(IngestError::Internal("boom".to_string()))
    }
}

struct Stop;

#[async_trait]
impl Task for Stop {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        Ok(state.interrupt())
    }
}

struct CountingCleanup(Arc<AtomicUsize>);

#[async_trait]
impl Task for CountingCleanup {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(state)
    }
}

/// Test that a failure in the middle task reaches the caller after one cleanup
#[tokio::test]
async fn test_failing_middle_task_runs_cleanup_once() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let mut pipeline = Pipeline::new()
        .with_task(Increment)
        .with_task(Boom)
        .with_task(Increment)
        .with_cleanup(CountingCleanup(cleanups.clone()));

    let err = pipeline.run(PipelineState::new()).await.unwrap_err();

    assert!(matches!(err, IngestError::Pipeline { .. }));
    assert!(err.to_string().contains("boom"));
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.status(), PipelineStatus::Failed);
}

/// Test that interruption stops the run and is not an error
#[tokio::test]
async fn test_interrupt_skips_remaining_tasks() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let mut pipeline = Pipeline::new()
        .with_task(Increment)
        .with_task(Stop)
        .with_task(Increment)
        .with_cleanup(CountingCleanup(cleanups.clone()));

    let state = pipeline.run(PipelineState::new()).await.unwrap();

    assert_eq!(state.int(ParamKey::FiasVersion), Some(1));
    assert!(state.is_interrupted());
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.status(), PipelineStatus::Interrupted);
}

/// Test that each task sees the state returned by the previous one
#[tokio::test]
async fn test_state_flows_between_tasks() {
    let initial = PipelineState::new().with(ParamKey::FiasVersion, 20240100i64);
    let mut pipeline = Pipeline::new()
        .with_task(Increment)
        .with_task(Increment)
        .with_task(Increment);

    let state = pipeline.run(initial.clone()).await.unwrap();

    assert_eq!(state.int(ParamKey::FiasVersion), Some(20240103));
    assert_eq!(initial.int(ParamKey::FiasVersion), Some(20240100));
    assert_eq!(pipeline.status(), PipelineStatus::Completed);
    assert!(pipeline.last_run_id().is_some());
}
