//! EMLX CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Crosswalks repository metadata records into EML 2.2.0 documents and
//! publishes them, with their data files, as packages on a DataONE member node.
//!
//! # Overview
//!
//! - **Conversion**: build EML from JSON records (`emlx convert`)
//! - **Publishing**: upload data, metadata and resource maps (`emlx upload`)
//! - **Metadata-only packages**: publish existing EML files (`emlx upload-eml`)
//! - **Ledger repair**: recover identifiers from the node (`emlx rectify`)
//! - **Access repair**: reapply the access policy (`emlx fix-access`)
//! - **Configuration**: inspect effective settings (`emlx config show`)

pub mod commands;
pub mod config;
pub mod coords;
pub mod eml;
pub mod error;
pub mod ledger;
pub mod member_node;
pub mod minter;
pub mod names;
pub mod orchestrator;
pub mod progress;
pub mod rectify;
pub mod report;
pub mod resource_map;

// Re-export commonly used types
pub use config::Config;
pub use error::{ImportError, Result};
pub use ledger::Ledger;
pub use orchestrator::{Orchestrator, PackageState};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// EMLX - metadata crosswalk and DataONE package publisher
#[derive(Parser, Debug)]
#[command(name = "emlx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ~/.config/emlx/config.toml)
    #[arg(short, long, env = "EMLX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Print the command reference as markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write JSON and EML files for every record without uploading
    Convert {
        /// Output directory (defaults to the configured data root)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload data files, metadata and resource maps for every record
    Upload {
        /// Only process the first N records
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Publish existing EML files as metadata-only packages
    UploadEml {
        /// Directory of *.xml EML documents
        dir: PathBuf,
    },

    /// Fill missing ledger identifiers from the member node's object list
    Rectify {
        /// Replace identifiers already in the ledger
        #[arg(long)]
        overwrite: bool,
    },

    /// Reapply the configured access policy to recently modified objects
    FixAccess {
        /// How many days back to look
        #[arg(short, long, default_value = "3")]
        days: u32,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
}
