//! Transform command implementation

use crate::store::RawStore;
use crate::transform::TransformPipeline;
use crate::Platform;
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

use super::sync::Cli;
use super::CliError;

/// Transform command arguments
#[derive(Parser, Debug)]
pub struct TransformArgs {}

impl TransformArgs {
    /// Render the raw store into the output directory.
    ///
    /// Works offline: no credential is required, so configuration falls back
    /// to directory defaults when the token env var is absent.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let platform = match cli.platform {
            Some(platform) => platform,
            None => match std::env::var("TICKET_EXPORTER_PLATFORM") {
                Ok(v) => Platform::from_str(&v).map_err(CliError::InvalidArgument)?,
                Err(_) => Platform::Pylon,
            },
        };
        let raw_dir = dir_from(cli.raw_dir.clone(), "TICKET_EXPORTER_RAW_DIR", "./raw");
        let out_dir = dir_from(cli.out_dir.clone(), "TICKET_EXPORTER_OUT_DIR", "./kapa_out");

        let store = RawStore::new(raw_dir);
        let report = TransformPipeline::new(platform, &out_dir).run(&store)?;

        println!(
            "wrote {} documents to {} ({} skipped)",
            report.documents,
            out_dir.display(),
            report.skipped
        );
        Ok(())
    }
}

fn dir_from(flag: Option<PathBuf>, var: &str, default: &str) -> PathBuf {
    flag.or_else(|| std::env::var(var).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default))
}
