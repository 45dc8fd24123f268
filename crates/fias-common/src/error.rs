//! Error types shared across the FIAS workspace

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, FiasError>;

/// Errors produced by the shared utilities
#[derive(Error, Debug)]
pub enum FiasError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}
