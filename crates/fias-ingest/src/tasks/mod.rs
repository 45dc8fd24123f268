//! Concrete pipeline tasks for install, update and worker runs

mod cleanup;
mod distribute;
mod download;
mod inform;
mod prepare;
mod process;
mod select;
mod status;
mod unpack;
mod version;

pub use cleanup::CleanupTask;
pub use distribute::DistributeTask;
pub use download::DownloadTask;
pub use inform::{InformDeltaTask, InformFullTask};
pub use prepare::PrepareFolderTask;
pub use process::{DryRunProcessor, FileKind, ProcessFilesTask, RecordProcessor};
pub use select::SelectFilesTask;
pub use status::StatusCheckTask;
pub use unpack::{ExtractSelectedTask, UnpackTask, WorkerFolderTask};
pub use version::SaveVersionTask;
