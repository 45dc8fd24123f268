//! Pipeline assembly for install, update and worker runs

use std::sync::Arc;
use tracing::info;

use crate::config::IngestConfig;
use crate::downloader::ResumableDownloader;
use crate::entity::{EntityManager, RegistryEntityManager};
use crate::error::Result;
use crate::http::{HttpTransport, ReqwestTransport};
use crate::informer::{HttpStatusChecker, HttpVersionInformer, StatusChecker, VersionInformer};
use crate::models::UpdateMode;
use crate::pipeline::{Pipeline, PipelineLogger, PipelineStatus, TracingLogger};
use crate::planner::ThreadPlanner;
use crate::runner::{CommandSpawner, ProcessSpawner, ThreadRunner};
use crate::selector::{
    ArchiveSelector, CompositeSelector, DirectorySelector, EntityFileMatcher, FileSelector,
    PlainFileSelector, RegexFilter,
};
use crate::state::{ParamKey, PipelineState};
use crate::tasks::{
    CleanupTask, DistributeTask, DownloadTask, DryRunProcessor, ExtractSelectedTask,
    InformDeltaTask, InformFullTask, PrepareFolderTask, ProcessFilesTask, RecordProcessor,
    SaveVersionTask, SelectFilesTask, StatusCheckTask, UnpackTask, WorkerFolderTask,
};
use crate::unpacker::{Unpacker, ZipUnpacker};
use crate::version_storage::{JsonFileVersionStorage, VersionStorage};

/// Owns the collaborators shared by every pipeline the loader builds
pub struct Loader {
    config: IngestConfig,
    entities: Arc<dyn EntityManager>,
    transport: Arc<dyn HttpTransport>,
    unpacker: Arc<dyn Unpacker>,
    informer: Arc<dyn VersionInformer>,
    status: Arc<dyn StatusChecker>,
    storage: Arc<dyn VersionStorage>,
    processor: Arc<dyn RecordProcessor>,
    spawner: Arc<dyn ProcessSpawner>,
    logger: Arc<dyn PipelineLogger>,
}

impl Loader {
    /// Production collaborators: reqwest transport, zip archives, JSON version
    /// file and worker processes running this binary
    pub fn from_config(config: IngestConfig) -> Result<Self> {
        let registry = match &config.entity_registry {
            Some(path) => RegistryEntityManager::from_file(path)?,
            None => RegistryEntityManager::builtin()?,
        };
        info!(entities = registry.len(), "Loaded entity registry");
        let entities: Arc<dyn EntityManager> = Arc::new(registry);
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(config.http_timeout())?);

        Ok(Self {
            informer: Arc::new(HttpVersionInformer::new(
                transport.clone(),
                config.informer_url.clone(),
            )),
            status: Arc::new(HttpStatusChecker::new(
                transport.clone(),
                config.informer_url.clone(),
            )),
            storage: Arc::new(JsonFileVersionStorage::new(config.version_file.clone())),
            unpacker: Arc::new(ZipUnpacker::new()),
            processor: Arc::new(DryRunProcessor),
            spawner: Arc::new(CommandSpawner::current_exe()?),
            logger: Arc::new(TracingLogger),
            entities,
            transport,
            config,
        })
    }

    pub fn with_informer(mut self, informer: Arc<dyn VersionInformer>) -> Self {
        self.informer = informer;
        self
    }

    pub fn with_status_checker(mut self, status: Arc<dyn StatusChecker>) -> Self {
        self.status = status;
        self
    }

    pub fn with_version_storage(mut self, storage: Arc<dyn VersionStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn RecordProcessor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn entities(&self) -> Arc<dyn EntityManager> {
        self.entities.clone()
    }

    pub fn matcher(&self) -> Result<EntityFileMatcher> {
        let matcher = EntityFileMatcher::new(self.entities.clone());
        if self.config.tables.is_empty() {
            return Ok(matcher);
        }
        Ok(matcher.with_filter(Arc::new(RegexFilter::for_tables(&self.config.tables)?)))
    }

    /// Selector over directories, archives and loose files; directories are walked recursively
    pub fn selector(&self) -> Result<CompositeSelector> {
        let matcher = self.matcher()?;
        Ok(CompositeSelector::new()
            .with_selector(DirectorySelector::new(matcher.clone()).recursive(true))
            .with_selector(ArchiveSelector::new(matcher.clone(), self.unpacker.clone()))
            .with_selector(PlainFileSelector::new(matcher)))
    }

    pub fn install_pipeline(&self) -> Result<Pipeline> {
        let pipeline = Pipeline::new().with_task(InformFullTask::new(self.informer.clone()));
        self.distribution_pipeline(pipeline, UpdateMode::Install)
    }

    pub fn update_pipeline(&self) -> Result<Pipeline> {
        let pipeline = Pipeline::new()
            .with_task(InformDeltaTask::new(self.informer.clone(), self.storage.clone()));
        self.distribution_pipeline(pipeline, UpdateMode::Update)
    }

    /// Shared tail of install and update: status check, download, select, distribute, record
    fn distribution_pipeline(&self, pipeline: Pipeline, mode: UpdateMode) -> Result<Pipeline> {
        let downloader = Arc::new(ResumableDownloader::new(
            self.transport.clone(),
            self.config.downloader_config(),
        ));
        let selector: Arc<dyn FileSelector> = Arc::new(self.selector()?);

        let mut pipeline = pipeline
            .with_task(StatusCheckTask::new(self.status.clone()))
            .with_task(PrepareFolderTask::new(&self.config.work_dir)?)
            .with_task(DownloadTask::new(downloader));

        let source = if self.config.extract_before_select {
            pipeline = pipeline.with_task(UnpackTask::new(self.unpacker.clone()));
            ParamKey::ExtractToFolder
        } else {
            ParamKey::DownloadTargetFile
        };

        let runner = ThreadRunner::new(self.spawner.clone())
            .with_poll_interval(self.config.worker_poll_interval());

        Ok(pipeline
            .with_task(SelectFilesTask::new(selector, source))
            .with_task(DistributeTask::new(
                ThreadPlanner::new(self.entities.clone()),
                runner,
                self.config.worker_count,
            ))
            .with_task(SaveVersionTask::new(self.storage.clone()))
            .with_cleanup(CleanupTask::new(!self.config.keep_downloads))
            .with_logger(self.logger.clone())
            .with_source(mode.as_str()))
    }

    /// Runs inside a worker process over the state handed down by the parent.
    /// The extraction folder is narrowed before anything can fail.
    pub fn worker_pipeline(&self, index: i64) -> Pipeline {
        Pipeline::new()
            .with_task(WorkerFolderTask)
            .with_task(ExtractSelectedTask::new(self.unpacker.clone()))
            .with_task(ProcessFilesTask::new(
                self.entities.clone(),
                self.processor.clone(),
            ))
            .with_cleanup(CleanupTask::new(false))
            .with_logger(self.logger.clone())
            .with_source(format!("worker-{}", index))
    }

    pub async fn install(&self) -> Result<PipelineStatus> {
        let mut pipeline = self.install_pipeline()?;
        pipeline.run(PipelineState::new()).await?;
        Ok(pipeline.status())
    }

    /// Applies every pending delta in version order
    pub async fn update(&self) -> Result<usize> {
        let mut applied = 0;
        loop {
            let mut pipeline = self.update_pipeline()?;
            pipeline.run(PipelineState::new()).await?;
            if pipeline.status() != PipelineStatus::Completed {
                break;
            }
            applied += 1;
        }
        info!(applied, "Update finished");
        Ok(applied)
    }

    pub async fn work(&self, state: PipelineState) -> Result<PipelineStatus> {
        let index = state.int(ParamKey::WorkerIndex).unwrap_or(0);
        let mut pipeline = self.worker_pipeline(index);
        pipeline.run(state).await?;
        Ok(pipeline.status())
    }
}
