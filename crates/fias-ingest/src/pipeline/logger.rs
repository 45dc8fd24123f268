//! Structured pipeline logging

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Level;

pub const PIPELINE_ID: &str = "pipeline_id";
pub const TASK: &str = "task";
pub const SOURCE: &str = "source";

/// Key-value context attached to one log event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogContext {
    values: BTreeMap<String, Value>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// `other` wins on conflicting keys
    pub fn merged(&self, other: &LogContext) -> Self {
        let mut values = self.values.clone();
        values.extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

pub trait PipelineLogger: Send + Sync {
    fn log(&self, level: Level, message: &str, context: &LogContext);
}

/// Forwards pipeline events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl PipelineLogger for TracingLogger {
    fn log(&self, level: Level, message: &str, context: &LogContext) {
        let pipeline_id = context.get_str(PIPELINE_ID).unwrap_or_default();
        let task = context.get_str(TASK).unwrap_or_default();
        let source = context.get_str(SOURCE).unwrap_or_default();
        let extra = context
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), PIPELINE_ID | TASK | SOURCE))
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        macro_rules! emit {
            ($macro:ident) => {
                tracing::$macro!(
                    pipeline_id = %pipeline_id,
                    task = %task,
                    source = %source,
                    context = %extra,
                    "{}",
                    message
                )
            };
        }

        match level {
            Level::ERROR => emit!(error),
            Level::WARN => emit!(warn),
            Level::INFO => emit!(info),
            Level::DEBUG => emit!(debug),
            _ => emit!(trace),
        }
    }
}

/// Logger handle given to log-aware tasks, pre-filled with the run's context.
///
/// The default handle has no logger and discards everything.
#[derive(Clone, Default)]
pub struct TaskLogger {
    logger: Option<Arc<dyn PipelineLogger>>,
    context: LogContext,
}

impl TaskLogger {
    pub fn new(logger: Arc<dyn PipelineLogger>, context: LogContext) -> Self {
        Self {
            logger: Some(logger),
            context,
        }
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn is_enabled(&self) -> bool {
        self.logger.is_some()
    }

    pub fn log(&self, level: Level, message: &str, extra: LogContext) {
        if let Some(logger) = &self.logger {
            logger.log(level, message, &self.context.merged(&extra));
        }
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message, LogContext::new());
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message, LogContext::new());
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message, LogContext::new());
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message, LogContext::new());
    }
}

impl std::fmt::Debug for TaskLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLogger")
            .field("enabled", &self.is_enabled())
            .field("context", &self.context)
            .finish()
    }
}
