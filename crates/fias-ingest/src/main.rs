//! FIAS Ingest - GAR address registry loader

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fias_common::logging::{init_logging, LogConfig};
use fias_ingest::config::IngestConfig;
use fias_ingest::loader::Loader;
use fias_ingest::planner::ThreadPlanner;
use fias_ingest::selector::FileSelector;
use fias_ingest::state::codec::decode_state_str;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fias-ingest")]
#[command(author, version, about = "FIAS/GAR address registry loader")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and load the latest full distribution
    Install(RunArgs),

    /// Apply every delta published after the installed version
    Update(RunArgs),

    /// Process a planned share of files; the state is read from stdin
    #[command(hide = true)]
    Worker,

    /// Show how files under a source would be split between workers
    Plan {
        /// Archive, directory or single file to select from
        #[arg(short, long)]
        source: PathBuf,

        /// Number of workers
        #[arg(short, long)]
        workers: Option<i64>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Work directory for downloads and extraction
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Number of worker processes
    #[arg(short, long)]
    workers: Option<i64>,

    /// Only load these tables, e.g. houses,addr_obj
    #[arg(long, value_delimiter = ',')]
    tables: Vec<String>,

    /// Extract the whole archive before selecting files
    #[arg(long)]
    extract: bool,

    /// Keep the downloaded archive after the run
    #[arg(long)]
    keep_downloads: bool,
}

impl RunArgs {
    fn apply(self, mut config: IngestConfig) -> Result<IngestConfig> {
        if let Some(work_dir) = self.work_dir {
            config.version_file = work_dir.join(fias_ingest::config::DEFAULT_VERSION_FILE_NAME);
            config.work_dir = work_dir;
        }
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        if !self.tables.is_empty() {
            config.tables = self.tables;
        }
        config.extract_before_select |= self.extract;
        config.keep_downloads |= self.keep_downloads;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Workers keep stdout free and report through the captured stderr
    let log_config = match cli.command {
        Command::Worker => LogConfig::worker(cli.verbose),
        _ => LogConfig::orchestrator(cli.verbose),
    };

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::load()?;

    match cli.command {
        Command::Install(args) => {
            let loader = Loader::from_config(args.apply(config)?)?;
            let status = loader.install().await?;
            info!(?status, "Install finished");
        },
        Command::Update(args) => {
            let loader = Loader::from_config(args.apply(config)?)?;
            let applied = loader.update().await?;
            info!(applied, "Deltas applied");
        },
        Command::Worker => {
            let mut payload = String::new();
            tokio::io::stdin()
                .read_to_string(&mut payload)
                .await
                .context("Failed to read worker state from stdin")?;
            let state = decode_state_str(&payload)?;

            let loader = Loader::from_config(config)?;
            let status = loader.work(state).await?;
            info!(?status, "Worker finished");
        },
        Command::Plan { source, workers } => {
            let loader = Loader::from_config(config)?;
            let workers = workers.unwrap_or(loader.config().worker_count);
            let files = loader.selector()?.select_files(&source)?;
            let plan = ThreadPlanner::new(loader.entities()).plan(&files, workers)?;

            for (index, group) in plan.iter().enumerate() {
                let bytes: u64 = group.iter().map(|f| f.size()).sum();
                println!("worker {}: {} files, {} bytes", index, group.len(), bytes);
                for file in group {
                    println!("  {}", file.path().display());
                }
            }
        },
    }

    Ok(())
}
