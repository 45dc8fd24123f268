//! Logging setup shared by the orchestrator and its worker processes
//!
//! Workers write to stderr so the parent can capture their diagnostics and
//! stdout stays free. The orchestrator writes to stdout and, optionally, to a
//! daily-rotated file. Library code emits structured `tracing` events only:
//!
//! ```rust
//! use tracing::{info, warn};
//!
//! let entity = "addr_obj";
//! info!(entity = %entity, files = 3, "Planned entity group");
//! warn!(attempt = 2, "Download attempt failed");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use fias_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::orchestrator(false).merge_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("Loader started");
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Where log records go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    #[default]
    Stdout,
    /// Used by worker processes
    Stderr,
    File,
    StdoutAndFile,
}

impl LogOutput {
    fn writes_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::StdoutAndFile)
    }
}

impl FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "stdout" | "console" => LogOutput::Stdout,
            "stderr" => LogOutput::Stderr,
            "file" => LogOutput::File,
            "both" | "stdout_and_file" => LogOutput::StdoutAndFile,
            other => anyhow::bail!("Unknown log output '{}'", other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => anyhow::bail!("Unknown log format '{}'", other),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub output: LogOutput,
    pub format: LogFormat,
    /// Directory for rotated files
    pub dir: PathBuf,
    /// File name prefix, `fias-ingest` gives `fias-ingest.2024-01-18`
    pub file_prefix: String,
    /// Extra directives such as `reqwest=warn,fias_ingest::downloader=debug`
    pub directives: Option<String>,
    pub with_source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Stdout,
            format: LogFormat::Text,
            dir: PathBuf::from("./logs"),
            file_prefix: "fias-ingest".to_string(),
            directives: None,
            with_source_location: false,
        }
    }
}

impl LogConfig {
    /// Parent process: stdout, debug level when verbose
    pub fn orchestrator(verbose: bool) -> Self {
        Self {
            level: if verbose { Level::DEBUG } else { Level::INFO },
            ..Self::default()
        }
    }

    /// Worker process: stderr without colours, captured by the parent
    pub fn worker(verbose: bool) -> Self {
        Self {
            output: LogOutput::Stderr,
            ..Self::orchestrator(verbose)
        }
    }

    /// Apply `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`,
    /// `LOG_FILE_PREFIX`, `LOG_FILTER` and `LOG_SOURCE_LOCATION` on top
    pub fn merge_env(self) -> Result<Self> {
        self.merge_lookup(|key| std::env::var(key).ok())
    }

    pub fn merge_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(level) = lookup("LOG_LEVEL") {
            self.level = level
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Unknown log level '{}'", level))?;
        }
        if let Some(output) = lookup("LOG_OUTPUT") {
            self.output = output.parse()?;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.dir = PathBuf::from(dir);
        }
        if let Some(prefix) = lookup("LOG_FILE_PREFIX") {
            self.file_prefix = prefix;
        }
        if let Some(directives) = lookup("LOG_FILTER") {
            self.directives = Some(directives);
        }
        if let Some(flag) = lookup("LOG_SOURCE_LOCATION") {
            self.with_source_location = flag.trim().eq_ignore_ascii_case("true");
        }
        Ok(self)
    }

    /// `RUST_LOG` first, then the configured level and directives
    fn filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::from_default_env().add_directive(self.level.into());
        let extra = self.directives.as_deref().unwrap_or_default();
        for directive in extra.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let parsed = directive
                .parse()
                .with_context(|| format!("Invalid log filter directive '{}'", directive))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_file(self.with_source_location)
            .with_line_number(self.with_source_location);
        match self.format {
            LogFormat::Text => layer.boxed(),
            LogFormat::Json => layer.json().boxed(),
        }
    }
}

/// Install the global subscriber once per process.
///
/// Keep the returned guard alive until exit; dropping it flushes the file writer.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    match config.output {
        LogOutput::Stdout | LogOutput::StdoutAndFile => {
            layers.push(config.layer(std::io::stdout, true))
        },
        LogOutput::Stderr => layers.push(config.layer(std::io::stderr, false)),
        LogOutput::File => {},
    }

    let guard = if config.output.writes_file() {
        std::fs::create_dir_all(&config.dir)
            .with_context(|| format!("Cannot create log directory {}", config.dir.display()))?;
        let appender = tracing_appender::rolling::daily(&config.dir, &config.file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(config.layer(writer, false));
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(config.filter()?)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(guard)
}
