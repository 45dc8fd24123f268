use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::models::SelectedFile;
use crate::pipeline::Task;
use crate::state::{ParamKey, PipelineState};
use crate::unpacker::Unpacker;

async fn blocking<T, F>(what: &str, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| IngestError::Internal(format!("{} task failed: {}", what, e)))?
}

/// Extracts the whole downloaded archive into `ExtractToFolder`
pub struct UnpackTask {
    unpacker: Arc<dyn Unpacker>,
}

impl UnpackTask {
    pub fn new(unpacker: Arc<dyn Unpacker>) -> Self {
        Self { unpacker }
    }
}

#[async_trait]
impl Task for UnpackTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        let archive = state.require_path(ParamKey::DownloadTargetFile)?.to_path_buf();
        let destination = state.require_path(ParamKey::ExtractToFolder)?.to_path_buf();
        let unpacker = self.unpacker.clone();

        info!(archive = %archive.display(), "Unpacking archive");
        blocking("unpack", move || unpacker.unpack(&archive, &destination)).await?;
        Ok(state)
    }
}

/// Points `ExtractToFolder` at `<ExtractToFolder>/worker-<index>`.
///
/// Runs first in a worker so that every later step, cleanup included, only
/// ever sees the worker's own folder.
pub struct WorkerFolderTask;

#[async_trait]
impl Task for WorkerFolderTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        let Some(base) = state.path(ParamKey::ExtractToFolder) else {
            return Ok(state);
        };
        let index = state.int(ParamKey::WorkerIndex).unwrap_or(0);
        let folder = base.join(format!("worker-{}", index));
        Ok(state.with(ParamKey::ExtractToFolder, folder))
    }
}

/// Worker-side extraction of only the assigned archive members into
/// `ExtractToFolder`. Each archive is opened once.
pub struct ExtractSelectedTask {
    unpacker: Arc<dyn Unpacker>,
}

impl ExtractSelectedTask {
    pub fn new(unpacker: Arc<dyn Unpacker>) -> Self {
        Self { unpacker }
    }
}

fn extract_assigned(
    unpacker: &dyn Unpacker,
    files: Vec<SelectedFile>,
    destination: &Path,
) -> Result<Vec<SelectedFile>> {
    std::fs::create_dir_all(destination)?;

    let mut by_archive: BTreeMap<PathBuf, Vec<usize>> = BTreeMap::new();
    for (position, file) in files.iter().enumerate() {
        if let Some(archive) = file.archive_path() {
            by_archive.entry(archive.to_path_buf()).or_default().push(position);
        }
    }

    let mut outputs: Vec<Option<PathBuf>> = vec![None; files.len()];
    for (archive, positions) in &by_archive {
        let names: Vec<String> = positions
            .iter()
            .map(|&p| files[p].path().to_string_lossy().into_owned())
            .collect();
        let written = unpacker.extract_entries(archive, &names, destination)?;
        debug!(archive = %archive.display(), entries = written.len(), "Extracted assigned entries");
        for (&position, output) in positions.iter().zip(written) {
            outputs[position] = Some(output);
        }
    }

    files
        .into_iter()
        .zip(outputs)
        .map(|(file, output)| match output {
            Some(output) => SelectedFile::new(output, file.size(), None),
            None => Ok(file),
        })
        .collect()
}

#[async_trait]
impl Task for ExtractSelectedTask {
    async fn run(&self, state: PipelineState) -> Result<PipelineState> {
        let destination = state.require_path(ParamKey::ExtractToFolder)?.to_path_buf();
        let files = state.files(ParamKey::FilesToProcess).to_vec();
        let unpacker = self.unpacker.clone();

        let extracted =
            blocking("extract", move || extract_assigned(unpacker.as_ref(), files, &destination))
                .await?;

        info!(files = extracted.len(), "Extracted assigned files");
        Ok(state.with(ParamKey::FilesToProcess, extracted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unpacker::tests::write_zip;
    use crate::unpacker::ZipUnpacker;

    #[tokio::test]
    async fn test_extracts_only_assigned_members() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("gar.zip");
        write_zip(&archive, &[("01/AS_HOUSES_1_a.XML", b"<h/>"), ("01/AS_STEADS_1_a.XML", b"<s/>")]);
        let loose = dir.path().join("AS_ROOMS_1_a.XML");
        std::fs::write(&loose, b"<r/>").unwrap();

        let state = PipelineState::new()
            .with(ParamKey::ExtractToFolder, dir.path().join("out"))
            .with(ParamKey::WorkerIndex, 2_i64)
            .with(
                ParamKey::FilesToProcess,
                vec![
                    SelectedFile::new("01/AS_HOUSES_1_a.XML", 4, Some(archive.clone())).unwrap(),
                    SelectedFile::new(&loose, 4, None).unwrap(),
                ],
            );

        let state = WorkerFolderTask.run(state).await.unwrap();
        let state = ExtractSelectedTask::new(Arc::new(ZipUnpacker::new()))
            .run(state)
            .await
            .unwrap();

        let worker_dir = dir.path().join("out/worker-2");
        let files = state.files(ParamKey::FilesToProcess);
        assert_eq!(files[0].path(), worker_dir.join("01/AS_HOUSES_1_a.XML").as_path());
        assert!(!files[0].is_archived());
        assert_eq!(files[1].path(), loose.as_path());
        assert!(!worker_dir.join("01/AS_STEADS_1_a.XML").exists());
        assert_eq!(state.path(ParamKey::ExtractToFolder), Some(worker_dir.as_path()));
    }

    #[tokio::test]
    async fn test_members_of_one_archive_keep_their_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.zip");
        let second = dir.path().join("b.zip");
        write_zip(&first, &[("AS_HOUSES_1_a.XML", b"1"), ("AS_STEADS_1_a.XML", b"2")]);
        write_zip(&second, &[("AS_ROOMS_1_a.XML", b"3")]);

        let files = vec![
            SelectedFile::new("AS_STEADS_1_a.XML", 1, Some(first.clone())).unwrap(),
            SelectedFile::new("AS_ROOMS_1_a.XML", 1, Some(second)).unwrap(),
            SelectedFile::new("AS_HOUSES_1_a.XML", 1, Some(first)).unwrap(),
        ];
        let out = dir.path().join("out");
        let extracted = extract_assigned(&ZipUnpacker::new(), files, &out).unwrap();

        let names: Vec<&str> = extracted.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["AS_STEADS_1_a.XML", "AS_ROOMS_1_a.XML", "AS_HOUSES_1_a.XML"]);
        assert_eq!(std::fs::read(out.join("AS_ROOMS_1_a.XML")).unwrap(), b"3");
    }

    #[tokio::test]
    async fn test_worker_folder_is_scoped_by_index() {
        let state = PipelineState::new()
            .with(ParamKey::ExtractToFolder, Path::new("/work/extracted"))
            .with(ParamKey::WorkerIndex, 5_i64);

        let state = WorkerFolderTask.run(state).await.unwrap();
        assert_eq!(
            state.path(ParamKey::ExtractToFolder),
            Some(Path::new("/work/extracted/worker-5"))
        );

        let untouched = WorkerFolderTask.run(PipelineState::new()).await.unwrap();
        assert!(untouched.path(ParamKey::ExtractToFolder).is_none());
    }

    #[tokio::test]
    async fn test_unpack_requires_paths() {
        let task = UnpackTask::new(Arc::new(ZipUnpacker::new()));
        assert!(matches!(task.run(PipelineState::new()).await, Err(IngestError::State(_))));
    }
}
