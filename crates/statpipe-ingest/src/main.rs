//! Statpipe Ingest - monitoring bundle ingestion tool

use anyhow::Result;
use clap::{Parser, Subcommand};
use statpipe_common::logging::{init_logging, LogConfig, LogLevel};
use statpipe_ingest::{inventory, Config, Pipeline};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "statpipe-ingest")]
#[command(author, version, about = "Ingest monitoring archive bundles into the time-series store")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a local bundle file
    Process {
        /// Path to a .tar, .tar.gz or .zip bundle
        file: PathBuf,
    },

    /// Fetch a bundle from object storage and process it
    ProcessObject {
        #[arg(long, env = "STATPIPE_SOURCE_BUCKET")]
        bucket: String,

        #[arg(long)]
        key: String,

        /// Leave the source bundle in place afterwards
        #[arg(long)]
        keep_source: bool,
    },

    /// List staged objects with presigned download links
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("statpipe-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = init_logging(&log_config)?;

    let config = Config::load()?;
    let pipeline = Pipeline::from_config(&config).await?;

    let output = match cli.command {
        Command::Process { file } => {
            info!(file = %file.display(), "Processing local bundle");
            let report = pipeline.process_file(&file).await?;
            serde_json::to_string_pretty(&report)?
        },
        Command::ProcessObject {
            bucket,
            key,
            keep_source,
        } => {
            info!(%bucket, %key, "Processing bundle from object storage");
            let report = pipeline.process_object(&bucket, &key, keep_source).await?;
            serde_json::to_string_pretty(&report)?
        },
        Command::List => {
            let staging = pipeline.staging();
            let entries = inventory::collect(
                pipeline.store().as_ref(),
                &staging.raw,
                &staging.processed,
                chrono::Utc::now(),
                inventory::PRESIGN_TTL,
            )
            .await?;
            serde_json::to_string_pretty(&entries)?
        },
    };

    println!("{}", output);
    Ok(())
}
