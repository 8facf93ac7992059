//! `emlx rectify` command implementation

use super::connect;
use crate::config::Config;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::{progress, rectify};
use colored::Colorize;

pub async fn run(config: &Config, overwrite: bool) -> Result<()> {
    let node = connect(config)?;
    let path = config.ledger_path();
    let mut ledger = Ledger::load(&path)?;
    if ledger.is_empty() {
        println!("{} Ledger at {} is empty, nothing to rectify", "ℹ".cyan(), path.display());
        return Ok(());
    }

    let spinner = progress::create_spinner("Listing member node objects...");
    let summary = rectify::rectify(&node, &mut ledger, &config.cn_url, overwrite).await;
    spinner.finish_and_clear();
    let summary = summary?;
    ledger.save(&path)?;

    println!("{} Rectified ledger {}", "✓".green(), path.display());
    println!("  Objects listed:   {}", summary.listed);
    println!("  Entries updated:  {}", summary.updated);
    println!("  Entries unmatched: {}", summary.unmatched);
    if summary.ambiguous > 0 {
        println!("  {} {} checksum(s) matched several objects", "!".yellow(), summary.ambiguous);
    }
    Ok(())
}
