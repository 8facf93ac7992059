//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function. The helpers
//! here turn a [`Config`] into the pieces every command needs.

pub mod config;
pub mod convert;
pub mod fix_access;
pub mod rectify;
pub mod upload;
pub mod upload_eml;

use crate::config::Config;
use crate::eml::{Crosswalk, DocumentBuilder};
use crate::error::{ImportError, Result};
use crate::member_node::client::HttpMemberNode;
use crate::member_node::Retrying;
use crate::orchestrator::{CancelFlag, PackageSettings};
use crate::report::RunReport;
use colored::Colorize;
use std::future::Future;
use tracing::warn;

/// Document builder using the configured crosswalk, or the figshare one
pub fn document_builder(config: &Config) -> Result<DocumentBuilder> {
    let crosswalk = match &config.crosswalk {
        Some(path) => Crosswalk::from_toml_file(path)?,
        None => Crosswalk::figshare(),
    };
    DocumentBuilder::new(&crosswalk, config.eml.clone())
}

/// Member node client wrapped in the configured retry policy
pub fn connect(config: &Config) -> Result<Retrying<HttpMemberNode>> {
    config.validate_for_upload()?;
    let token = config.token();
    if token.is_none() {
        warn!("No member node token found, calls will be anonymous");
    }
    let node = HttpMemberNode::new(config.mn_url.clone(), token, config.timeout())?;
    Ok(Retrying::new(node, config.retry.clone()))
}

pub fn package_settings(config: &Config) -> PackageSettings {
    PackageSettings {
        rights_holder: config.rightsholder_orcid.clone(),
        node_id: config.node_id.clone(),
        cn_url: config.cn_url.clone(),
        access: config.access.clone(),
    }
}

/// Exit code when a second interrupt aborts the process
pub const FORCED_EXIT_CODE: i32 = 130;

/// Set `flag` on Ctrl-C; the running batch stops before its next dataset.
/// A second Ctrl-C exits at once, since every success is already in the ledger.
pub fn cancel_on_ctrl_c(flag: CancelFlag) {
    tokio::spawn(async move {
        if handle_interrupts(flag, tokio::signal::ctrl_c).await {
            std::process::exit(FORCED_EXIT_CODE);
        }
    });
}

/// Cancel on the first interrupt from `next`, return true on the second
async fn handle_interrupts<F, Fut>(flag: CancelFlag, mut next: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next().await.is_err() {
        return false;
    }
    eprintln!(
        "{} Interrupt received, finishing the current dataset (Ctrl-C again to quit now)",
        "!".yellow()
    );
    flag.cancel();

    if next().await.is_err() {
        return false;
    }
    eprintln!("{} Second interrupt, exiting", "!".red());
    true
}

/// Print the report and turn failures into an error for the exit code
pub fn finish(report: &RunReport) -> Result<()> {
    println!();
    println!("{report}");
    if let Some(table) = report.failure_table() {
        println!();
        println!("{table}");
    }
    if report.cancelled {
        return Err(ImportError::Cancelled);
    }
    if report.has_failures() {
        return Err(ImportError::Other(anyhow::anyhow!(
            "{} package(s) and {} upload(s) failed",
            report.packages_failed.len(),
            report.uploads_failed
        )));
    }
    println!("{} All packages complete", "✓".green());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::future::ready;
    use std::io;

    #[tokio::test]
    async fn test_second_interrupt_forces_exit() {
        let flag = CancelFlag::new();
        let forced = handle_interrupts(flag.clone(), || ready(Ok(()))).await;
        assert!(forced);
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_first_interrupt_only_cancels() {
        let flag = CancelFlag::new();
        let mut calls = 0;
        let forced = handle_interrupts(flag.clone(), || {
            calls += 1;
            if calls == 1 {
                ready(Ok(()))
            } else {
                ready(Err(io::Error::other("signal handler gone")))
            }
        })
        .await;
        assert!(!forced);
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_no_handler_leaves_run_alone() {
        let flag = CancelFlag::new();
        let forced = handle_interrupts(flag.clone(), || ready(Err(io::Error::other("unsupported")))).await;
        assert!(!forced);
        assert!(!flag.is_cancelled());
    }
}
