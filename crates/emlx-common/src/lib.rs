//! EMLX Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the EMLX workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`EmlxError`] and the [`Result`] alias
//! - **Checksums**: MD5 (what DataONE records) and SHA-256 for local verification
//! - **Logging**: subscriber setup shared by every binary
//! - **Types**: the loosely-typed source record and its typed views
//! - **Layout**: where dataset directories live under the data root
//!
//! # Example
//!
//! ```no_run
//! use emlx_common::checksum::{compute_file_checksum, ChecksumAlgorithm};
//! use emlx_common::Result;
//!
//! fn describe(path: &str) -> Result<()> {
//!     let md5 = compute_file_checksum(path, ChecksumAlgorithm::Md5)?;
//!     println!("{path}: {md5}");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod formats;
pub mod layout;
pub mod logging;
pub mod records;
pub mod types;

// Re-export commonly used types
pub use error::{EmlxError, Result};
