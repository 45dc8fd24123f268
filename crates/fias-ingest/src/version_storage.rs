//! Installed version bookkeeping

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::error::{IngestError, Result};
use crate::models::UpdateMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledVersion {
    pub version: i64,
    pub installed_at: DateTime<Utc>,
    pub mode: UpdateMode,
}

#[async_trait]
pub trait VersionStorage: Send + Sync {
    /// Most recently installed version, if any
    async fn current(&self) -> Result<Option<InstalledVersion>>;

    async fn save(&self, version: i64, mode: UpdateMode) -> Result<InstalledVersion>;
}

/// Stores the installed version history in a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileVersionStorage {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VersionFile {
    history: Vec<InstalledVersion>,
}

impl JsonFileVersionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<VersionFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                IngestError::State(format!("corrupt version file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(VersionFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file, then rename over the original
    async fn write(&self, file: &VersionFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, serde_json::to_vec_pretty(file)?).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl VersionStorage for JsonFileVersionStorage {
    async fn current(&self) -> Result<Option<InstalledVersion>> {
        Ok(self.read().await?.history.last().cloned())
    }

    async fn save(&self, version: i64, mode: UpdateMode) -> Result<InstalledVersion> {
        let mut file = self.read().await?;
        if let Some(current) = file.history.last() {
            if mode == UpdateMode::Update && version <= current.version {
                return Err(IngestError::State(format!(
                    "version {} is not newer than installed version {}",
                    version, current.version
                )));
            }
        }

        let installed = InstalledVersion {
            version,
            installed_at: Utc::now(),
            mode,
        };
        file.history.push(installed.clone());
        self.write(&file).await?;

        info!(version, mode = mode.as_str(), path = %self.path.display(), "Installed version saved");
        Ok(installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_then_saved() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileVersionStorage::new(dir.path().join("state/version.json"));

        assert!(storage.current().await.unwrap().is_none());

        storage.save(20240102, UpdateMode::Install).await.unwrap();
        storage.save(20240105, UpdateMode::Update).await.unwrap();

        let current = storage.current().await.unwrap().unwrap();
        assert_eq!(current.version, 20240105);
        assert_eq!(current.mode, UpdateMode::Update);
    }

    #[tokio::test]
    async fn test_update_must_move_forward() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileVersionStorage::new(dir.path().join("version.json"));
        storage.save(20240105, UpdateMode::Install).await.unwrap();

        let err = storage.save(20240102, UpdateMode::Update).await.unwrap_err();
        assert!(matches!(err, IngestError::State(_)));

        // a fresh install may go backwards
        storage.save(20240102, UpdateMode::Install).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("version.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = JsonFileVersionStorage::new(&path).current().await.unwrap_err();
        assert!(matches!(err, IngestError::State(_)));
    }
}
