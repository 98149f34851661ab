//! Sync and reset command implementations

use crate::config::{ExporterConfig, MAX_CONCURRENCY};
use crate::cursor::CursorStore;
use crate::engine::SyncExecutor;
use crate::shutdown::ShutdownHandle;
use crate::{Collection, Platform};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::CliError;

/// Parse and validate a concurrency value.
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Ticket Data Exporter CLI
#[derive(Parser, Debug)]
#[command(name = "ticket-data-exporter")]
#[command(about = "Incrementally export issue tracking data to Kapa.ai markdown", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Source platform (pylon or linear)
    #[arg(long, global = true)]
    pub platform: Option<Platform>,

    /// Checkpoint state directory (default: ./state)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Raw record store directory (default: ./raw)
    #[arg(long, global = true)]
    pub raw_dir: Option<PathBuf>,

    /// Transform output directory (default: ./kapa_out)
    #[arg(long, global = true)]
    pub out_dir: Option<PathBuf>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch issues and comments into the raw store
    Sync(SyncArgs),

    /// Render the raw store into Kapa.ai markdown + index.json
    Transform(super::transform::TransformArgs),

    /// Discard checkpoints so the next sync starts from scratch
    Reset(ResetArgs),
}

/// Sync command arguments
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Collections to fetch (comma separated: issues,comments)
    #[arg(long, value_delimiter = ',')]
    pub collections: Vec<Collection>,

    /// How many days back to fetch (default: 180)
    #[arg(long)]
    pub days_back: Option<u32>,

    /// Linear team to filter by
    #[arg(long)]
    pub team_id: Option<String>,

    /// Fetch issues in every state, not only closed/completed ones
    #[arg(long, default_value_t = false)]
    pub all_states: bool,

    /// Concurrent comment-thread fetches (default: 2, max: 8)
    #[arg(long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,
}

impl SyncArgs {
    /// Run a sync and report the outcome. Returns an error when any
    /// collection finishes in a non-success state so the process exits
    /// nonzero and the operator knows to re-run.
    pub async fn execute(&self, cli: &Cli, shutdown: ShutdownHandle) -> Result<(), CliError> {
        let config = resolve_config(cli, Some(self))?;

        let executor = SyncExecutor::new(config.clone())?.with_shutdown(shutdown);

        let spinner = ProgressBar::new_spinner();
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message(format!("Syncing from {}", config.platform));

        let summary = executor.run().await;
        spinner.finish_and_clear();

        println!("{}", summary.render_table());

        if summary.all_success() {
            Ok(())
        } else {
            Err(CliError::SyncIncomplete)
        }
    }
}

/// Reset command arguments
#[derive(Parser, Debug)]
pub struct ResetArgs {
    /// Collections to reset (default: all)
    #[arg(long, value_delimiter = ',')]
    pub collections: Vec<Collection>,
}

impl ResetArgs {
    /// Remove checkpoint files. Raw store contents are never touched.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let state_dir = cli
            .state_dir
            .clone()
            .or_else(|| std::env::var("TICKET_EXPORTER_STATE_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("./state"));
        let store = CursorStore::new(state_dir);

        let collections: Vec<Collection> = if self.collections.is_empty() {
            Collection::all().to_vec()
        } else {
            self.collections.clone()
        };
        for collection in collections {
            store.reset(collection)?;
            info!(collection = %collection, "Checkpoint reset");
        }
        Ok(())
    }
}

/// Resolve the effective configuration: environment first, CLI overrides on
/// top.
pub fn resolve_config(cli: &Cli, sync: Option<&SyncArgs>) -> Result<ExporterConfig, CliError> {
    let mut config = match cli.platform {
        Some(platform) => ExporterConfig::from_env_for(platform)?,
        None => ExporterConfig::from_env()?,
    };

    if let Some(dir) = &cli.state_dir {
        config.state_dir = dir.clone();
    }
    if let Some(dir) = &cli.raw_dir {
        config.raw_dir = dir.clone();
    }
    if let Some(dir) = &cli.out_dir {
        config.out_dir = dir.clone();
    }

    if let Some(sync) = sync {
        if !sync.collections.is_empty() {
            config.collections = sync.collections.clone();
        }
        if let Some(days_back) = sync.days_back {
            config.days_back = days_back;
        }
        if sync.team_id.is_some() {
            config.team_id = sync.team_id.clone();
        }
        if sync.all_states {
            config.fetch_all_states = true;
        }
        if let Some(concurrency) = sync.concurrency {
            config.concurrency = concurrency;
        }
    }

    config.validate()?;
    Ok(config)
}
