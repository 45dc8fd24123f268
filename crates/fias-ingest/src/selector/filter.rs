use regex::{Regex, RegexBuilder};

use crate::error::{IngestError, Result};
use crate::models::SelectedFile;

/// Caller-supplied predicate applied before entity matching
pub trait FileFilter: Send + Sync {
    fn accepts(&self, file: &SelectedFile) -> bool;
}

impl<F> FileFilter for F
where
    F: Fn(&SelectedFile) -> bool + Send + Sync,
{
    fn accepts(&self, file: &SelectedFile) -> bool {
        self(file)
    }
}

/// Accepts files whose base name matches a case-insensitive pattern
#[derive(Debug, Clone)]
pub struct RegexFilter {
    regex: Regex,
}

impl RegexFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| IngestError::Config(format!("invalid file filter '{}': {}", pattern, e)))?;
        Ok(Self { regex })
    }

    /// Filter that keeps files of the named GAR tables only,
    /// e.g. `["houses", "addr_obj"]` keeps `AS_HOUSES_*` and `AS_ADDR_OBJ_*`.
    pub fn for_tables(tables: &[String]) -> Result<Self> {
        if tables.is_empty() {
            return Err(IngestError::Config("table filter is empty".to_string()));
        }
        let alternatives = tables
            .iter()
            .map(|t| regex::escape(&t.trim().to_uppercase()))
            .collect::<Vec<_>>()
            .join("|");
        Self::new(&format!(r"^AS_({})(_DEL)?_[0-9]+_[0-9a-z\-]+\.XML$", alternatives))
    }
}

impl FileFilter for RegexFilter {
    fn accepts(&self, file: &SelectedFile) -> bool {
        self.regex.is_match(file.file_name())
    }
}
