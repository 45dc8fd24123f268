//! File-name masks
//!
//! A mask is either a `/pattern/flags` regular expression or a glob-like
//! string where `*` stands for one or more `[0-9a-zA-Z-]` characters.
//! Matching is always case-insensitive.

use regex::{Regex, RegexBuilder};

use crate::error::{IngestError, Result};

const WILDCARD: &str = r"[0-9a-zA-Z\-]+";

#[derive(Debug, Clone)]
pub struct FileMask {
    source: String,
    regex: Regex,
}

impl FileMask {
    pub fn new(mask: &str) -> Result<Self> {
        let mask = mask.trim();
        if mask.is_empty() {
            return Err(IngestError::Config("file mask is empty".to_string()));
        }

        let pattern = match regex_literal(mask) {
            Some(pattern) => pattern.to_string(),
            None => {
                let body = mask
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(WILDCARD);
                format!("^{}$", body)
            },
        };

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| IngestError::Config(format!("invalid file mask '{}': {}", mask, e)))?;

        Ok(Self {
            source: mask.to_string(),
            regex,
        })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for FileMask {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for FileMask {}

/// Body of a `/pattern/flags` mask. Only `i` is accepted as a flag.
fn regex_literal(mask: &str) -> Option<&str> {
    let rest = mask.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);
    if body.is_empty() || !flags.chars().all(|c| c == 'i') {
        return None;
    }
    Some(body)
}
