//! `emlx upload` command implementation
//!
//! Runs every record through the package upload sequence.

use super::{cancel_on_ctrl_c, connect, document_builder, finish, package_settings};
use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::{CancelFlag, ImportContext, Orchestrator};
use crate::progress;
use colored::Colorize;
use emlx_common::layout::DataRoot;
use emlx_common::records::load_records;

pub async fn run(config: &Config, limit: Option<usize>) -> Result<()> {
    let node = connect(config)?;
    let builder = document_builder(config)?;
    let mut records = load_records(&config.metadata_json)?;
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    let cancel = CancelFlag::new();
    cancel_on_ctrl_c(cancel.clone());
    let ctx = ImportContext::open(config.ledger_path(), DataRoot::new(config.data_root.clone()), cancel)?;

    println!(
        "{} Uploading {} dataset(s) to {}",
        "→".cyan(),
        records.len(),
        config.mn_url
    );
    let pb = progress::create_batch_progress(records.len() as u64, "Uploading packages");
    let mut orchestrator = Orchestrator::new(node, builder, package_settings(config), ctx).with_progress(pb.clone());
    let report = orchestrator.run_batch(&records).await;
    pb.finish_and_clear();

    finish(&report)
}
