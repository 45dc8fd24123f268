//! Immutable pipeline state
//!
//! Values are keyed by the closed [`ParamKey`] enumeration, so a typo in a key
//! is a compile error rather than a silent no-op. Every transition returns a
//! new [`PipelineState`]; the original is never touched, which makes states
//! safe to share between tasks and to hand across the process boundary.

pub mod codec;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{IngestError, Result};
use crate::models::{RemoteVersionInfo, SelectedFile, UpdateMode};

/// Parameter names recognized by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKey {
    /// Soft-stop request raised by a task
    InterruptPipeline,
    FilesToProcess,
    FiasVersion,
    ExtractToFolder,
    RemoteSourceInfo,
    DownloadTargetFile,
    UpdateMode,
    WorkerIndex,
}

impl ParamKey {
    pub const ALL: [ParamKey; 8] = [
        ParamKey::InterruptPipeline,
        ParamKey::FilesToProcess,
        ParamKey::FiasVersion,
        ParamKey::ExtractToFolder,
        ParamKey::RemoteSourceInfo,
        ParamKey::DownloadTargetFile,
        ParamKey::UpdateMode,
        ParamKey::WorkerIndex,
    ];

    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKey::InterruptPipeline => "interrupt_pipeline",
            ParamKey::FilesToProcess => "files_to_process",
            ParamKey::FiasVersion => "fias_version",
            ParamKey::ExtractToFolder => "extract_to_folder",
            ParamKey::RemoteSourceInfo => "remote_source_info",
            ParamKey::DownloadTargetFile => "download_target_file",
            ParamKey::UpdateMode => "update_mode",
            ParamKey::WorkerIndex => "worker_index",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

impl std::fmt::Display for ParamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value stored under a [`ParamKey`]
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Flag(bool),
    Int(i64),
    Path(PathBuf),
    Files(Arc<Vec<SelectedFile>>),
    Remote(RemoteVersionInfo),
    Mode(UpdateMode),
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Flag(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<PathBuf> for ParamValue {
    fn from(value: PathBuf) -> Self {
        ParamValue::Path(value)
    }
}

impl From<&Path> for ParamValue {
    fn from(value: &Path) -> Self {
        ParamValue::Path(value.to_path_buf())
    }
}

impl From<Vec<SelectedFile>> for ParamValue {
    fn from(value: Vec<SelectedFile>) -> Self {
        ParamValue::Files(Arc::new(value))
    }
}

impl From<RemoteVersionInfo> for ParamValue {
    fn from(value: RemoteVersionInfo) -> Self {
        ParamValue::Remote(value)
    }
}

impl From<UpdateMode> for ParamValue {
    fn from(value: UpdateMode) -> Self {
        ParamValue::Mode(value)
    }
}

/// Immutable key-value carrier threaded through pipeline tasks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    params: Arc<BTreeMap<ParamKey, ParamValue>>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// New state with `key` set to `value`
    pub fn with(&self, key: ParamKey, value: impl Into<ParamValue>) -> Self {
        let mut params = (*self.params).clone();
        params.insert(key, value.into());
        Self {
            params: Arc::new(params),
        }
    }

    /// New state with every pair applied in order
    pub fn with_list<I>(&self, values: I) -> Self
    where
        I: IntoIterator<Item = (ParamKey, ParamValue)>,
    {
        let mut params = (*self.params).clone();
        params.extend(values);
        Self {
            params: Arc::new(params),
        }
    }

    /// New state with `key` removed
    pub fn without(&self, key: ParamKey) -> Self {
        if !self.params.contains_key(&key) {
            return self.clone();
        }
        let mut params = (*self.params).clone();
        params.remove(&key);
        Self {
            params: Arc::new(params),
        }
    }

    pub fn get(&self, key: ParamKey) -> Option<&ParamValue> {
        self.params.get(&key)
    }

    pub fn contains(&self, key: ParamKey) -> bool {
        self.params.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, &ParamValue)> {
        self.params.iter().map(|(k, v)| (*k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.get(ParamKey::InterruptPipeline), Some(ParamValue::Flag(true)))
    }

    /// Shorthand for setting the interrupt flag
    pub fn interrupt(&self) -> Self {
        self.with(ParamKey::InterruptPipeline, true)
    }

    pub fn int(&self, key: ParamKey) -> Option<i64> {
        match self.get(key) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn path(&self, key: ParamKey) -> Option<&Path> {
        match self.get(key) {
            Some(ParamValue::Path(p)) => Some(p.as_path()),
            _ => None,
        }
    }

    /// Files under `key`; empty when unset
    pub fn files(&self, key: ParamKey) -> &[SelectedFile] {
        match self.get(key) {
            Some(ParamValue::Files(files)) => files.as_slice(),
            _ => &[],
        }
    }

    pub fn remote_info(&self) -> Option<&RemoteVersionInfo> {
        match self.get(ParamKey::RemoteSourceInfo) {
            Some(ParamValue::Remote(info)) => Some(info),
            _ => None,
        }
    }

    pub fn update_mode(&self) -> UpdateMode {
        match self.get(ParamKey::UpdateMode) {
            Some(ParamValue::Mode(mode)) => *mode,
            _ => UpdateMode::default(),
        }
    }

    pub fn require_path(&self, key: ParamKey) -> Result<&Path> {
        match self.get(key) {
            Some(ParamValue::Path(p)) if !p.as_os_str().is_empty() => Ok(p.as_path()),
            Some(ParamValue::Path(_)) => {
                Err(IngestError::Config(format!("parameter '{}' is an empty path", key)))
            },
            Some(other) => Err(IngestError::State(format!(
                "parameter '{}' holds {:?}, expected a path",
                key, other
            ))),
            None => Err(IngestError::State(format!("parameter '{}' is not set", key))),
        }
    }

    pub fn require_int(&self, key: ParamKey) -> Result<i64> {
        self.int(key)
            .ok_or_else(|| IngestError::State(format!("integer parameter '{}' is not set", key)))
    }

    pub fn require_remote_info(&self) -> Result<&RemoteVersionInfo> {
        self.remote_info().ok_or_else(|| {
            IngestError::State(format!("parameter '{}' is not set", ParamKey::RemoteSourceInfo))
        })
    }
}
