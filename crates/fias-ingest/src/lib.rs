//! FIAS Ingest Library
//!
//! Loader for the Russian federal address registry (GAR/FIAS) distributed as
//! large zip archives of XML files.
//!
//! # Overview
//!
//! - **Pipeline**: sequential tasks over an immutable [`state::PipelineState`]
//!   with a cleanup step that always runs
//! - **Downloader**: resumable HTTP downloads with bounded retries
//! - **Selector**: picks registry files from directories and archives
//! - **Planner**: splits files between workers, keeping each entity's
//!   inserts and deletes together and sizes balanced
//! - **Runner**: one OS process per planned group, state passed on stdin
//!
//! # Example
//!
//! ```no_run
//! use fias_ingest::config::IngestConfig;
//! use fias_ingest::loader::Loader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let loader = Loader::from_config(IngestConfig::load()?)?;
//!     loader.install().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod downloader;
pub mod entity;
pub mod error;
pub mod http;
pub mod informer;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod planner;
pub mod runner;
pub mod selector;
pub mod state;
pub mod tasks;
pub mod unpacker;
pub mod version_storage;

pub use error::{IngestError, Result};
pub use models::{RemoteVersionInfo, SelectedFile, UpdateMode};
pub use pipeline::{Pipeline, PipelineStatus, Task};
pub use state::{ParamKey, ParamValue, PipelineState};
