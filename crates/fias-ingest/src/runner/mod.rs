//! Runs one worker process per planned state
//!
//! Every process is started before any is waited on, and a failing worker
//! never stops its siblings. Failures are reported together once all
//! processes have exited.

pub mod process;

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{IngestError, Result};
use crate::state::codec::encode_state_string;
use crate::state::PipelineState;
pub use process::{CommandSpawner, ProcessSpawner, WorkerProcess};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct ThreadRunner {
    spawner: Arc<dyn ProcessSpawner>,
    poll_interval: Duration,
}

struct Worker {
    index: usize,
    process: Option<Box<dyn WorkerProcess>>,
    /// Set when the worker could not be started at all
    start_error: Option<String>,
}

impl ThreadRunner {
    pub fn new(spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            spawner,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run one worker per state and wait for all of them
    pub async fn run(&self, states: Vec<PipelineState>) -> Result<()> {
        if states.is_empty() {
            return Ok(());
        }

        let total = states.len();
        let mut workers = Vec::with_capacity(total);
        for (index, state) in states.iter().enumerate() {
            let payload = encode_state_string(state)?;
            let process = self.spawner.spawn(index, payload)?;
            workers.push(Worker {
                index,
                process: Some(process),
                start_error: None,
            });
        }

        for worker in workers.iter_mut() {
            if let Some(process) = worker.process.as_mut() {
                if let Err(e) = process.start().await {
                    error!(worker = worker.index, error = %e, "Worker failed to start");
                    worker.start_error = Some(e.to_string());
                    worker.process = None;
                }
            }
        }
        info!(workers = total, "Started worker processes");

        self.wait_all(&mut workers).await?;

        let mut failed = Vec::new();
        for worker in workers.iter_mut() {
            let successful = worker.process.as_ref().is_some_and(|p| p.is_successful());
            if !successful {
                warn!(worker = worker.index, "Worker process failed");
                failed.push(worker.index);
            }
        }

        let Some(&first) = failed.first() else {
            info!(workers = total, "All worker processes finished");
            return Ok(());
        };

        let worker = &mut workers[first];
        let stderr = match (&worker.start_error, worker.process.as_mut()) {
            (Some(message), _) => message.clone(),
            (None, Some(process)) => process.error_output().await,
            (None, None) => String::new(),
        };

        Err(IngestError::Worker {
            failed: failed.len(),
            total,
            index: first,
            stderr: stderr.trim().to_string(),
        })
    }

    async fn wait_all(&self, workers: &mut [Worker]) -> Result<()> {
        loop {
            let mut running = 0;
            for worker in workers.iter_mut() {
                if let Some(process) = worker.process.as_mut() {
                    if process.is_running()? {
                        running += 1;
                    }
                }
            }
            if running == 0 {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::codec::decode_state_str;
    use crate::state::ParamKey;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Journal {
        payloads: Mutex<Vec<String>>,
        started: Mutex<Vec<usize>>,
    }

    struct FakeProcess {
        index: usize,
        polls_left: usize,
        succeed: bool,
        started: bool,
        journal: Arc<Journal>,
    }

    #[async_trait]
    impl WorkerProcess for FakeProcess {
        async fn start(&mut self) -> Result<()> {
            self.started = true;
            self.journal.started.lock().unwrap().push(self.index);
            Ok(())
        }

        fn is_running(&mut self) -> Result<bool> {
            if self.polls_left == 0 {
                return Ok(false);
            }
            self.polls_left -= 1;
            Ok(true)
        }

        fn is_successful(&self) -> bool {
            self.started && self.polls_left == 0 && self.succeed
        }

        async fn error_output(&mut self) -> String {
            format!("worker {} stderr\n", self.index)
        }
    }

    /// Workers whose index is in `failing` exit unsuccessfully
    struct FakeSpawner {
        failing: Vec<usize>,
        journal: Arc<Journal>,
    }

    impl ProcessSpawner for FakeSpawner {
        fn spawn(&self, index: usize, payload: String) -> Result<Box<dyn WorkerProcess>> {
            self.journal.payloads.lock().unwrap().push(payload);
            Ok(Box::new(FakeProcess {
                index,
                polls_left: index + 1,
                succeed: !self.failing.contains(&index),
                started: false,
                journal: self.journal.clone(),
            }))
        }
    }

    fn states(count: i64) -> Vec<PipelineState> {
        (0..count)
            .map(|i| PipelineState::new().with(ParamKey::WorkerIndex, i))
            .collect()
    }

    fn runner(failing: Vec<usize>) -> (ThreadRunner, Arc<Journal>) {
        let journal = Arc::new(Journal::default());
        let spawner = FakeSpawner {
            failing,
            journal: journal.clone(),
        };
        let runner = ThreadRunner::new(Arc::new(spawner)).with_poll_interval(Duration::ZERO);
        (runner, journal)
    }

    #[tokio::test]
    async fn test_all_workers_succeed() {
        let (runner, journal) = runner(Vec::new());

        runner.run(states(3)).await.unwrap();

        assert_eq!(*journal.started.lock().unwrap(), vec![0, 1, 2]);
        let payloads = journal.payloads.lock().unwrap();
        for (index, payload) in payloads.iter().enumerate() {
            let state = decode_state_str(payload).unwrap();
            assert_eq!(state.int(ParamKey::WorkerIndex), Some(index as i64));
        }
    }

    #[tokio::test]
    async fn test_failures_are_aggregated_after_all_finish() {
        let (runner, journal) = runner(vec![1, 2]);

        let err = runner.run(states(4)).await.unwrap_err();

        assert_eq!(journal.started.lock().unwrap().len(), 4);
        match err {
            IngestError::Worker {
                failed,
                total,
                index,
                stderr,
            } => {
                assert_eq!((failed, total, index), (2, 4, 1));
                assert_eq!(stderr, "worker 1 stderr");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_states_spawns_nothing() {
        let (runner, journal) = runner(Vec::new());
        runner.run(Vec::new()).await.unwrap();
        assert!(journal.payloads.lock().unwrap().is_empty());
    }
}
