//! EMLX Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Fetches the files a source repository publishes for each record into the
//! data root, where the `emlx` uploader expects to find them.
//!
//! # Example
//!
//! ```no_run
//! use emlx_common::records::load_records;
//! use emlx_ingest::download::{DownloadSettings, Downloader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let records = load_records("records.json")?;
//!     let downloader = Downloader::new("./data", DownloadSettings::default())?;
//!     let summary = downloader.download_records(&records).await;
//!     println!("{} downloaded, {} failed", summary.downloaded, summary.failed.len());
//!     Ok(())
//! }
//! ```

pub mod download;

pub use download::{DownloadSettings, DownloadSummary, Downloader, FileOutcome};
