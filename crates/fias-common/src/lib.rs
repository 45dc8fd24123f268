//! FIAS Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the FIAS loader workspace.
//!
//! # Overview
//!
//! - **Error Handling**: `FiasError` and the crate-wide `Result` alias
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Checksums**: file integrity verification for downloaded archives
//! - **Types**: small shared enums and URL validation
//!
//! # Example
//!
//! ```no_run
//! use fias_common::{Result, FiasError};
//! use fias_common::checksum::compute_file_checksum;
//! use fias_common::types::ChecksumAlgorithm;
//!
//! fn archive_digest(path: &str) -> Result<String> {
//!     compute_file_checksum(path, ChecksumAlgorithm::Sha256)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{FiasError, Result};
