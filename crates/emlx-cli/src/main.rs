//! EMLX CLI - Main entry point

use clap::Parser;
use emlx_cli::{Cli, Commands, Config, ConfigCommand};
use emlx_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // .env values become environment variables before anything reads them
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(command) = cli.command.as_ref() else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("emlx")
        .build();
    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    // Kept alive so buffered file output is flushed on exit
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: logging disabled: {e}");
            None
        },
    };

    let result = match Config::load(cli.config.as_deref()) {
        Ok(config) => execute_command(command, &config, cli.config.as_deref()).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute_command(
    command: &Commands,
    config: &Config,
    config_path: Option<&std::path::Path>,
) -> emlx_cli::Result<()> {
    match command {
        Commands::Convert { output } => emlx_cli::commands::convert::run(config, output.clone()),
        Commands::Upload { limit } => emlx_cli::commands::upload::run(config, *limit).await,
        Commands::UploadEml { dir } => emlx_cli::commands::upload_eml::run(config, dir).await,
        Commands::Rectify { overwrite } => emlx_cli::commands::rectify::run(config, *overwrite).await,
        Commands::FixAccess { days } => emlx_cli::commands::fix_access::run(config, *days).await,
        Commands::Config { command } => match command {
            ConfigCommand::Show => emlx_cli::commands::config::show(config, config_path),
        },
    }
}
