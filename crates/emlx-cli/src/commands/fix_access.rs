//! `emlx fix-access` command implementation

use super::connect;
use crate::config::Config;
use crate::error::{ImportError, Result};
use crate::{progress, rectify};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

pub async fn run(config: &Config, days: u32) -> Result<()> {
    let node = connect(config)?;

    let spinner = progress::create_spinner(&format!("Updating access policies for the last {days} day(s)..."));
    let summary = rectify::fix_access(&node, days, &config.access).await;
    spinner.finish_and_clear();
    let summary = summary?;

    println!("  Objects listed:    {}", summary.listed);
    println!("  Policies updated:  {}", summary.updated);
    println!("  Already correct:   {}", summary.unchanged);
    if summary.failed.is_empty() {
        println!("{} Access policies up to date", "✓".green());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Identifier", "Error"]);
    for (pid, reason) in &summary.failed {
        table.add_row(vec![pid.as_str(), reason.as_str()]);
    }
    println!("{table}");
    Err(ImportError::Other(anyhow::anyhow!(
        "{} object(s) could not be updated",
        summary.failed.len()
    )))
}
