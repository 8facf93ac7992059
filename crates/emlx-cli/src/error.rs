//! Error types for the import pipeline
//!
//! Messages are user-facing: each says what went wrong and, where there is
//! one, what to do about it.

use crate::member_node::ServiceError;
use emlx_common::EmlxError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ImportError>;

/// Error type for everything the `emlx` binary does
#[derive(Error, Debug)]
pub enum ImportError {
    /// The member node rejected a call or could not be reached
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Required file is missing
    #[error("File not found: '{}'. Verify the path exists and is readable.", .0.display())]
    FileNotFound(PathBuf),

    /// A dataset has no data file on disk
    #[error("No local files found for dataset '{dataset}' under '{}'. Run 'emlx-ingest download' first.", .dir.display())]
    NoLocalFiles { dataset: String, dir: PathBuf },

    /// Local file content differs from what the source repository declared
    #[error("Checksum verification failed for '{file}': expected '{expected}', got '{actual}'. The local copy may be corrupted; re-download it.")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// The built document lacks a structurally required element
    #[error("Metadata record '{dataset}' is invalid: {reason}")]
    Validation { dataset: String, reason: String },

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your config file or EMLX_* environment variables.")]
    Config(String),

    /// The ledger could not be written
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// XML could not be read or written
    #[error("XML error: {0}")]
    Xml(String),

    /// Operator interrupted the run
    #[error("Cancelled by operator")]
    Cancelled,

    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    #[error("Network request failed: {0}. Check your connection and the member node URL.")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] EmlxError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a ledger error
    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    /// Create an XML error
    pub fn xml(msg: impl Into<String>) -> Self {
        Self::Xml(msg.into())
    }

    /// Create a validation error
    pub fn validation(dataset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            dataset: dataset.into(),
            reason: reason.into(),
        }
    }

    /// Create a checksum mismatch error
    pub fn checksum_mismatch(
        file: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChecksumMismatch {
            file: file.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl From<quick_xml::DeError> for ImportError {
    fn from(e: quick_xml::DeError) -> Self {
        Self::Xml(e.to_string())
    }
}

