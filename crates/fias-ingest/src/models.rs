//! Value types shared by the selector, planner and worker pipelines

use fias_common::types::validate_http_url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

/// One member file chosen for processing.
///
/// `path` is a filesystem path for loose files and the entry name when the
/// file lives inside `archive_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    path: PathBuf,
    size: u64,
    archive_path: Option<PathBuf>,
}

impl SelectedFile {
    /// Zero-byte files are never selected.
    pub fn new(path: impl Into<PathBuf>, size: u64, archive_path: Option<PathBuf>) -> Result<Self> {
        let path = path.into();
        if size == 0 {
            return Err(IngestError::Config(format!(
                "selected file {} must have a non-zero size",
                path.display()
            )));
        }
        if path.as_os_str().is_empty() {
            return Err(IngestError::Config("selected file path is empty".to_string()));
        }
        Ok(Self {
            path,
            size,
            archive_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn archive_path(&self) -> Option<&Path> {
        self.archive_path.as_deref()
    }

    pub fn is_archived(&self) -> bool {
        self.archive_path.is_some()
    }

    /// Base name used for entity mask matching
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Entry in an archive's table of contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedEntry {
    pub name: String,
    pub index: usize,
    pub size: u64,
}

/// Which kind of distribution a run installs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Full snapshot into an empty store
    #[default]
    Install,
    /// Delta on top of an installed version
    Update,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Install => "install",
            UpdateMode::Update => "update",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "install" => Some(UpdateMode::Install),
            "update" => Some(UpdateMode::Update),
            _ => None,
        }
    }
}

/// Remote version number with its download locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVersionInfo {
    version: i64,
    full_url: Option<String>,
    delta_url: Option<String>,
}

impl RemoteVersionInfo {
    /// Empty URLs are treated as absent; non-empty ones must be HTTP(S).
    pub fn new(version: i64, full_url: Option<String>, delta_url: Option<String>) -> Result<Self> {
        if version <= 0 {
            return Err(IngestError::Config(format!(
                "remote version must be positive, got {}",
                version
            )));
        }

        Ok(Self {
            version,
            full_url: normalize_url(full_url)?,
            delta_url: normalize_url(delta_url)?,
        })
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn full_url(&self) -> Option<&str> {
        self.full_url.as_deref()
    }

    pub fn delta_url(&self) -> Option<&str> {
        self.delta_url.as_deref()
    }

    /// URL to download for the given mode
    pub fn url_for(&self, mode: UpdateMode) -> Option<&str> {
        match mode {
            UpdateMode::Install => self.full_url(),
            UpdateMode::Update => self.delta_url(),
        }
    }
}

fn normalize_url(url: Option<String>) -> Result<Option<String>> {
    match url.map(|u| u.trim().to_string()) {
        Some(u) if !u.is_empty() => {
            validate_http_url(&u).map_err(|e| IngestError::Config(e.to_string()))?;
            Ok(Some(u))
        },
        _ => Ok(None),
    }
}
