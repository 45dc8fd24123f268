//! Error types for the ingest pipeline
//!
//! Low-level causes (network, zip, IO) are wrapped into the narrowest variant
//! before they cross a component boundary; the original error stays reachable
//! through `std::error::Error::source`.

use fias_common::FiasError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Invalid arguments or settings, raised before any I/O and never retried
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-layer failure talking to a remote endpoint
    #[error("Transport error for {url}: {message}")]
    Transport {
        url: String,
        message: String,
        #[source]
        source: Option<BoxedCause>,
    },

    /// Every download attempt failed; carries the last cause
    #[error("Download of {url} failed after {attempts} attempt(s): {source}")]
    Download {
        url: String,
        attempts: u32,
        #[source]
        source: Box<IngestError>,
    },

    /// The last download attempt completed with a non-2xx status
    #[error("Download of {url} failed after {attempts} attempt(s): bad HTTP status {status}")]
    BadStatus { url: String, attempts: u32, status: u16 },

    /// A pipeline task failed; cleanup already ran when this is returned
    #[error("Pipeline task '{task}' failed: {message}")]
    Pipeline {
        task: String,
        message: String,
        #[source]
        source: Box<IngestError>,
    },

    /// One or more worker processes exited unsuccessfully
    #[error("{failed} of {total} worker(s) failed; worker {index} reported: {stderr}")]
    Worker {
        failed: usize,
        total: usize,
        index: usize,
        stderr: String,
    },

    #[error("Archive error for {path}: {message}")]
    Archive {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<zip::result::ZipError>,
    },

    /// A required state parameter is missing or has the wrong type
    #[error("Invalid pipeline state: {0}")]
    State(String),

    /// Cross-process state payload could not be encoded or decoded
    #[error("State codec error: {0}")]
    Codec(String),

    /// The registry service answered, but not with something usable
    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] FiasError),

    /// Failure raised by a task or an external collaborator
    #[error("{0}")]
    Internal(String),
}

impl IngestError {
    pub fn transport(url: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        let source = source.into();
        IngestError::Transport {
            url: url.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        IngestError::Archive {
            path: path.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Wrap a task failure into the pipeline-level error
    pub fn pipeline(task: impl Into<String>, cause: IngestError) -> Self {
        IngestError::Pipeline {
            task: task.into(),
            message: cause.to_string(),
            source: Box::new(cause),
        }
    }

    /// True for errors that must not be retried because the input itself is wrong
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            IngestError::Config(_)
                | IngestError::Common(FiasError::Config(_))
                | IngestError::Common(FiasError::InvalidUrl { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_pipeline_error_keeps_cause() {
        let err = IngestError::pipeline("DownloadTask", IngestError::Internal("boom".into()));
        assert_eq!(err.to_string(), "Pipeline task 'DownloadTask' failed: boom");
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("boom"));
    }

    #[test]
    fn test_is_config() {
        assert!(IngestError::Config("workers".into()).is_config());
        assert!(IngestError::Common(FiasError::InvalidUrl {
            url: "x".into(),
            reason: "bad".into()
        })
        .is_config());
        assert!(!IngestError::Internal("x".into()).is_config());
    }
}
