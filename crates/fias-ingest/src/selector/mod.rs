//! File selection over directories, archives and single files
//!
//! A candidate is kept only if it is non-empty, passes the optional filter,
//! and belongs to an entity that has a destination binding.

mod filter;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::entity::EntityManager;
use crate::error::{IngestError, Result};
use crate::models::SelectedFile;
use crate::unpacker::Unpacker;
pub use filter::{FileFilter, RegexFilter};

pub trait FileSelector: Send + Sync {
    /// Whether this selector understands `source`
    fn supports(&self, source: &Path) -> bool;

    fn select_files(&self, source: &Path) -> Result<Vec<SelectedFile>>;
}

/// Shared keep/drop rules for every selector
#[derive(Clone)]
pub struct EntityFileMatcher {
    entities: Arc<dyn EntityManager>,
    filter: Option<Arc<dyn FileFilter>>,
}

impl EntityFileMatcher {
    pub fn new(entities: Arc<dyn EntityManager>) -> Self {
        Self {
            entities,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn FileFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Build the selected file, or `None` when the candidate is dropped
    pub fn keep(
        &self,
        path: impl Into<PathBuf>,
        size: u64,
        archive_path: Option<&Path>,
    ) -> Result<Option<SelectedFile>> {
        if size == 0 {
            return Ok(None);
        }
        let file = SelectedFile::new(path, size, archive_path.map(Path::to_path_buf))?;

        if let Some(filter) = &self.filter {
            if !filter.accepts(&file) {
                return Ok(None);
            }
        }

        let bound = self
            .entities
            .descriptor_for_file(file.file_name())
            .is_some_and(|descriptor| self.entities.binding_for(&descriptor).is_some());
        if !bound {
            debug!(file = %file.path().display(), "No bound entity for file");
            return Ok(None);
        }

        Ok(Some(file))
    }
}

/// File entries of a directory, in path order.
///
/// Only immediate entries are listed unless recursion is enabled; extracted
/// GAR archives keep region files in numbered subfolders.
pub struct DirectorySelector {
    matcher: EntityFileMatcher,
    recursive: bool,
}

impl DirectorySelector {
    pub fn new(matcher: EntityFileMatcher) -> Self {
        Self {
            matcher,
            recursive: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    fn collect(&self, dir: &Path, out: &mut Vec<(PathBuf, u64)>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                out.push((entry.path(), metadata.len()));
            } else if metadata.is_dir() && self.recursive {
                self.collect(&entry.path(), out)?;
            }
        }
        Ok(())
    }
}

impl FileSelector for DirectorySelector {
    fn supports(&self, source: &Path) -> bool {
        source.is_dir()
    }

    fn select_files(&self, source: &Path) -> Result<Vec<SelectedFile>> {
        let mut entries = Vec::new();
        self.collect(source, &mut entries)?;
        entries.sort();

        let mut selected = Vec::new();
        for (path, size) in entries {
            if let Some(file) = self.matcher.keep(path, size, None)? {
                selected.push(file);
            }
        }

        info!(source = %source.display(), selected = selected.len(), "Selected files from directory");
        Ok(selected)
    }
}

/// Members of an archive, read from its table of contents only
pub struct ArchiveSelector {
    matcher: EntityFileMatcher,
    unpacker: Arc<dyn Unpacker>,
}

impl ArchiveSelector {
    pub fn new(matcher: EntityFileMatcher, unpacker: Arc<dyn Unpacker>) -> Self {
        Self { matcher, unpacker }
    }
}

impl FileSelector for ArchiveSelector {
    fn supports(&self, source: &Path) -> bool {
        source.is_file() && self.unpacker.is_archive(source)
    }

    fn select_files(&self, source: &Path) -> Result<Vec<SelectedFile>> {
        let mut selected = Vec::new();
        for entry in self.unpacker.list_files(source)? {
            if let Some(file) = self.matcher.keep(entry.name, entry.size, Some(source))? {
                selected.push(file);
            }
        }

        info!(source = %source.display(), selected = selected.len(), "Selected files from archive");
        Ok(selected)
    }
}

/// A single loose file
pub struct PlainFileSelector {
    matcher: EntityFileMatcher,
}

impl PlainFileSelector {
    pub fn new(matcher: EntityFileMatcher) -> Self {
        Self { matcher }
    }
}

impl FileSelector for PlainFileSelector {
    fn supports(&self, source: &Path) -> bool {
        source.is_file()
    }

    fn select_files(&self, source: &Path) -> Result<Vec<SelectedFile>> {
        let size = std::fs::metadata(source)?.len();
        Ok(self.matcher.keep(source, size, None)?.into_iter().collect())
    }
}

/// Delegates to the first nested selector that supports the source
#[derive(Default)]
pub struct CompositeSelector {
    selectors: Vec<Box<dyn FileSelector>>,
}

impl CompositeSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selector(mut self, selector: impl FileSelector + 'static) -> Self {
        self.selectors.push(Box::new(selector));
        self
    }

    /// Directory, archive and plain-file selectors sharing one matcher
    pub fn standard(matcher: EntityFileMatcher, unpacker: Arc<dyn Unpacker>) -> Self {
        Self::new()
            .with_selector(DirectorySelector::new(matcher.clone()))
            .with_selector(ArchiveSelector::new(matcher.clone(), unpacker))
            .with_selector(PlainFileSelector::new(matcher))
    }
}

impl FileSelector for CompositeSelector {
    fn supports(&self, source: &Path) -> bool {
        self.selectors.iter().any(|s| s.supports(source))
    }

    fn select_files(&self, source: &Path) -> Result<Vec<SelectedFile>> {
        self.selectors
            .iter()
            .find(|s| s.supports(source))
            .ok_or_else(|| {
                IngestError::Config(format!("no selector supports source {}", source.display()))
            })?
            .select_files(source)
    }
}
