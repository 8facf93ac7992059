//! `emlx convert` command implementation
//!
//! Writes the JSON record and generated EML document of every dataset into
//! the data root without contacting the member node.

use super::document_builder;
use crate::config::Config;
use crate::eml::to_xml_string;
use crate::error::{ImportError, Result};
use crate::ledger::Ledger;
use crate::minter::IdentifierMinter;
use colored::Colorize;
use emlx_common::layout::DataRoot;
use emlx_common::records::load_records;
use emlx_common::types::SourceRecord;
use std::path::PathBuf;
use tracing::{error, info};

pub fn run(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let records = load_records(&config.metadata_json)?;
    let builder = document_builder(config)?;
    let data_root = DataRoot::new(output.unwrap_or_else(|| config.data_root.clone()));
    // package ids already used on the node keep documents stable across runs
    let ledger = Ledger::load(&config.ledger_path())?;
    let mut minter = IdentifierMinter::new();

    println!("{} Converting {} record(s)", "→".cyan(), records.len());
    let mut failed = 0usize;
    for (index, record) in records.iter().enumerate() {
        match convert_one(record, &builder, &data_root, &ledger, &mut minter) {
            Ok(path) => println!("{} {}", "✓".green(), path.display()),
            Err(e) => {
                let label = record
                    .dataset_id()
                    .unwrap_or_else(|| format!("record #{}", index + 1));
                error!(dataset = %label, error = %e, "Conversion failed");
                println!("{} {}: {}", "✗".red(), label, e);
                failed += 1;
            },
        }
    }

    info!(records = records.len(), failed, "Conversion finished");
    if failed > 0 {
        return Err(ImportError::Other(anyhow::anyhow!(
            "{failed} of {} record(s) could not be converted",
            records.len()
        )));
    }
    Ok(())
}

fn convert_one(
    record: &SourceRecord,
    builder: &crate::eml::DocumentBuilder,
    data_root: &DataRoot,
    ledger: &Ledger,
    minter: &mut IdentifierMinter,
) -> Result<PathBuf> {
    let dataset = record
        .dataset_id()
        .ok_or_else(|| ImportError::validation("<unknown>", "record has neither doi nor id"))?;
    let title = record.title().unwrap_or_else(|| dataset.clone());
    let package_id = match ledger.package_id(&dataset) {
        Some(existing) => existing.to_string(),
        None => minter.package_id(record),
    };

    let doc = builder.build_validated(record, &package_id)?;
    let xml = to_xml_string(&doc)?;
    data_root.write_json(&dataset, &title, &serde_json::to_value(record)?)?;
    Ok(data_root.write_xml(&dataset, &title, &xml)?)
}
