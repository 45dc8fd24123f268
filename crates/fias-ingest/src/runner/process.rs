//! Worker OS processes

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};

/// Handle to one worker process
#[async_trait]
pub trait WorkerProcess: Send {
    async fn start(&mut self) -> Result<()>;

    /// Non-blocking check; records the exit status once the process ends
    fn is_running(&mut self) -> Result<bool>;

    /// True only after the process exited with success
    fn is_successful(&self) -> bool;

    /// Captured stderr, available once the process has exited
    async fn error_output(&mut self) -> String;
}

/// Creates worker handles from a serialized state payload
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, index: usize, payload: String) -> Result<Box<dyn WorkerProcess>>;
}

/// Spawns `program args...` and feeds the payload on stdin
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl CommandSpawner {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    /// The running binary's own `worker` subcommand
    pub fn current_exe() -> Result<Self> {
        let exe = std::env::current_exe()?;
        Ok(Self::new(exe, ["worker"]))
    }

    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl ProcessSpawner for CommandSpawner {
    fn spawn(&self, index: usize, payload: String) -> Result<Box<dyn WorkerProcess>> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env("FIAS_WORKER_INDEX", index.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Ok(Box::new(CommandProcess {
            index,
            command: Some(command),
            payload: Some(payload),
            child: None,
            status: None,
            stderr: None,
            stderr_text: None,
        }))
    }
}

struct CommandProcess {
    index: usize,
    command: Option<Command>,
    payload: Option<String>,
    child: Option<Child>,
    status: Option<ExitStatus>,
    stderr: Option<JoinHandle<String>>,
    stderr_text: Option<String>,
}

#[async_trait]
impl WorkerProcess for CommandProcess {
    async fn start(&mut self) -> Result<()> {
        let mut command = self.command.take().ok_or_else(|| {
            IngestError::Internal(format!("worker {} was already started", self.index))
        })?;
        let mut child = command.spawn()?;

        if let (Some(mut stdin), Some(payload)) = (child.stdin.take(), self.payload.take()) {
            let index = self.index;
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    warn!(worker = index, error = %e, "Failed to send state to worker");
                }
                // stdin closes on drop so the worker sees EOF
            });
        }

        if let Some(mut stderr) = child.stderr.take() {
            self.stderr = Some(tokio::spawn(async move {
                let mut buffer = Vec::new();
                let _ = stderr.read_to_end(&mut buffer).await;
                String::from_utf8_lossy(&buffer).into_owned()
            }));
        }

        debug!(worker = self.index, pid = ?child.id(), "Worker process started");
        self.child = Some(child);
        Ok(())
    }

    fn is_running(&mut self) -> Result<bool> {
        if self.status.is_some() {
            return Ok(false);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(false);
        };
        match child.try_wait()? {
            Some(status) => {
                debug!(worker = self.index, status = %status, "Worker process exited");
                self.status = Some(status);
                Ok(false)
            },
            None => Ok(true),
        }
    }

    fn is_successful(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    async fn error_output(&mut self) -> String {
        if let Some(handle) = self.stderr.take() {
            self.stderr_text = Some(handle.await.unwrap_or_default());
        }
        self.stderr_text.clone().unwrap_or_default()
    }
}
