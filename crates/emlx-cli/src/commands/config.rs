//! `emlx config` command implementation

use crate::config::{default_config_path, Config};
use crate::error::Result;
use colored::Colorize;
use std::path::Path;

/// Show the effective configuration
pub fn show(config: &Config, source: Option<&Path>) -> Result<()> {
    let file = source
        .map(Path::to_path_buf)
        .or_else(default_config_path)
        .filter(|path| path.exists());

    println!("{}", "EMLX Configuration:".cyan().bold());
    match file {
        Some(path) => println!("{:<15} {}", "file:", path.display()),
        None => println!("{:<15} {}", "file:", "(defaults)".dimmed()),
    }
    println!("{:<15} {}", "ledger:", config.ledger_path().display());
    let token = if config.token().is_some() { "set".green() } else { "not set".yellow() };
    println!("{:<15} {}", "token:", token);
    println!();
    println!("{}", config.to_toml()?);
    println!("{}", "Environment Variables:".cyan());
    println!("  EMLX_NODE_ID, EMLX_MN_URL, EMLX_CN_URL, EMLX_RIGHTSHOLDER_ORCID");
    println!("  EMLX_METADATA_JSON, EMLX_DATA_ROOT, EMLX_WORK_DIR, EMLX_CROSSWALK");
    println!("  EMLX_TIMEOUT_SECS, EMLX_RETRY_MAX_ATTEMPTS, EMLX_TOKEN");
    Ok(())
}
