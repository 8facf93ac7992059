//! EMLX Ingest - source file downloader

use anyhow::Result;
use clap::Parser;
use emlx_common::logging::{init_logging, LogConfig, LogLevel};
use emlx_common::records::load_records;
use emlx_ingest::download::{DownloadSettings, Downloader, DEFAULT_MAX_ATTEMPTS};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "emlx-ingest")]
#[command(author, version, about = "EMLX source file downloader")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Download every file of every record into the data root
    Download {
        /// JSON array of source records
        #[arg(short, long, env = "EMLX_METADATA_JSON", default_value = "records.json")]
        records: PathBuf,

        /// Data root directory
        #[arg(short, long, env = "EMLX_DATA_ROOT", default_value = "data")]
        data_root: PathBuf,

        /// Attempts per file
        #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 3600)]
        timeout_secs: u64,

        /// Only process the first N records
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("emlx-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Download {
            records,
            data_root,
            max_attempts,
            timeout_secs,
            limit,
        } => {
            let mut records = load_records(&records)?;
            if let Some(limit) = limit {
                records.truncate(limit);
            }
            info!(records = records.len(), root = %data_root.display(), "Downloading source files");

            let settings = DownloadSettings {
                max_attempts,
                timeout: Duration::from_secs(timeout_secs),
                show_progress: true,
            };
            let summary = Downloader::new(data_root, settings)?
                .download_records(&records)
                .await;

            println!("Download report:");
            println!("  Downloaded:      {}", summary.downloaded);
            println!("  Already present: {}", summary.present);
            println!("  Skipped:         {}", summary.skipped);
            println!("  Failed:          {}", summary.failed.len());
            for (file, reason) in &summary.failed {
                println!("    {file}: {reason}");
            }
            if !summary.failed.is_empty() {
                anyhow::bail!("{} file(s) could not be downloaded", summary.failed.len());
            }
        },
    }

    info!("Download complete");
    Ok(())
}
