use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::Level;

use crate::entity::{EntityDescriptor, EntityManager};
use crate::error::{IngestError, Result};
use crate::pipeline::{LogAware, LogContext, Task, TaskLogger};
use crate::state::{ParamKey, PipelineState};

/// Whether a file carries rows to upsert or rows to remove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Insert,
    Delete,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Insert => "insert",
            FileKind::Delete => "delete",
        }
    }
}

/// Parses one registry file and stores its records; returns the record count
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    async fn process(
        &self,
        file: &Path,
        descriptor: &EntityDescriptor,
        binding: &str,
        kind: FileKind,
    ) -> Result<u64>;
}

/// Counts `<... />` records without storing anything
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunProcessor;

#[async_trait]
impl RecordProcessor for DryRunProcessor {
    async fn process(
        &self,
        file: &Path,
        _descriptor: &EntityDescriptor,
        _binding: &str,
        _kind: FileKind,
    ) -> Result<u64> {
        let mut reader = tokio::fs::File::open(file).await?;
        let mut buffer = vec![0u8; 64 * 1024];
        let mut previous = 0u8;
        let mut records = 0u64;

        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            for &byte in &buffer[..read] {
                if previous == b'/' && byte == b'>' {
                    records += 1;
                }
                previous = byte;
            }
        }
        Ok(records)
    }
}

/// Feeds every assigned file to the record processor, inserts and deletes
/// in the order the planner produced
pub struct ProcessFilesTask {
    entities: Arc<dyn EntityManager>,
    processor: Arc<dyn RecordProcessor>,
    logger: TaskLogger,
}

impl ProcessFilesTask {
    pub fn new(entities: Arc<dyn EntityManager>, processor: Arc<dyn RecordProcessor>) -> Self {
        Self {
            entities,
            processor,
            logger: TaskLogger::default(),
        }
    }
}

#[async_trait]
impl Task for ProcessFilesTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        for file in state.files(ParamKey::FilesToProcess) {
            if file.is_archived() {
                return Err(IngestError::State(format!(
                    "{} is still inside an archive, extract it first",
                    file.path().display()
                )));
            }

            let name = file.file_name();
            let (descriptor, kind) = match self.entities.descriptor_by_insert_file(name) {
                Some(d) => (d, FileKind::Insert),
                None => self
                    .entities
                    .descriptor_by_delete_file(name)
                    .map(|d| (d, FileKind::Delete))
                    .ok_or_else(|| IngestError::State(format!("{} matches no entity", name)))?,
            };
            let binding = self.entities.binding_for(&descriptor).ok_or_else(|| {
                IngestError::State(format!("entity '{}' has no binding", descriptor.name()))
            })?;

            let records = self.processor.process(file.path(), &descriptor, &binding, kind).await?;

            self.logger.log(
                Level::INFO,
                "Processed file",
                LogContext::new()
                    .with("file", name)
                    .with("entity", descriptor.name())
                    .with("kind", kind.as_str())
                    .with("records", records),
            );
        }
        Ok(state)
    }

    fn as_log_aware(&mut self) -> Option<&mut dyn LogAware> {
        Some(self)
    }
}

impl LogAware for ProcessFilesTask {
    fn inject_logger(&mut self, logger: TaskLogger) {
        self.logger = logger;
    }
}
