//! Main entry point for the ticket-data-exporter CLI

use clap::Parser;
use ticket_data_exporter::cli::{Cli, Commands};
use ticket_data_exporter::shutdown::ShutdownSignal;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ticket_data_exporter=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    // The sync loop polls this between pages and stops at the next page
    // boundary, leaving a resumable checkpoint.
    let shutdown = ShutdownSignal::handle();
    shutdown.listen_for_ctrl_c();

    let result = match &cli.command {
        Commands::Sync(args) => args.execute(&cli, shutdown.clone()).await,
        Commands::Transform(args) => args.execute(&cli),
        Commands::Reset(args) => args.execute(&cli),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
