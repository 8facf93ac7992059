//! `emlx upload-eml` command implementation
//!
//! Publishes existing EML files as metadata-only packages.

use super::{cancel_on_ctrl_c, connect, document_builder, finish, package_settings};
use crate::config::Config;
use crate::error::{ImportError, Result};
use crate::orchestrator::{CancelFlag, ImportContext, Orchestrator};
use colored::Colorize;
use emlx_common::layout::DataRoot;
use std::path::Path;

pub async fn run(config: &Config, dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(ImportError::FileNotFound(dir.to_path_buf()));
    }
    let node = connect(config)?;
    let builder = document_builder(config)?;

    let cancel = CancelFlag::new();
    cancel_on_ctrl_c(cancel.clone());
    let ctx = ImportContext::open(config.ledger_path(), DataRoot::new(config.data_root.clone()), cancel)?;

    println!("{} Uploading EML documents from {}", "→".cyan(), dir.display());
    let mut orchestrator = Orchestrator::new(node, builder, package_settings(config), ctx);
    let report = orchestrator.upload_eml_folder(dir).await?;

    finish(&report)
}
