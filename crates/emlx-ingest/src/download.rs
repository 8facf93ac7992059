//! Source file download with checksum verification
//!
//! Every file of a record goes to `<data_root>/<doi>/<name>`. A file whose
//! local MD5 already matches the declared one is left alone. Downloads are
//! verified by size and MD5 and retried on mismatch, but a server that hands
//! out the same wrong content twice in a row is not asked a third time.

use emlx_common::checksum::{verify_file_checksum, ChecksumAlgorithm};
use emlx_common::types::{FileRef, SourceRecord};
use emlx_common::EmlxError;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Default attempts per file
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Why one download attempt failed
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error("transfer failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("cannot write file: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Client errors will not change on retry
    pub fn is_permanent(&self) -> bool {
        matches!(self, DownloadError::Status(status) if status.is_client_error())
    }
}

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub show_progress: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: Duration::from_secs(3600),
            show_progress: false,
        }
    }
}

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    AlreadyPresent,
    Downloaded { attempts: u32 },
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub present: usize,
    pub downloaded: usize,
    pub skipped: usize,
    /// `(doi/name, reason)`
    pub failed: Vec<(String, String)>,
}

impl DownloadSummary {
    fn record(&mut self, label: String, outcome: FileOutcome) {
        match outcome {
            FileOutcome::AlreadyPresent => self.present += 1,
            FileOutcome::Downloaded { .. } => self.downloaded += 1,
            FileOutcome::Skipped(_) => self.skipped += 1,
            FileOutcome::Failed(reason) => self.failed.push((label, reason)),
        }
    }
}

/// Size and MD5 of what one attempt wrote
#[derive(Debug, Clone, PartialEq, Eq)]
struct Received {
    size: u64,
    md5: String,
}

pub struct Downloader {
    client: Client,
    root: PathBuf,
    settings: DownloadSettings,
}

impl Downloader {
    pub fn new(root: impl Into<PathBuf>, settings: DownloadSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("emlx-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            root: root.into(),
            settings,
        })
    }

    /// Download every file of every record, isolating failures per file
    pub async fn download_records(&self, records: &[SourceRecord]) -> DownloadSummary {
        let mut summary = DownloadSummary::default();
        for record in records {
            let Some(doi) = record.doi() else {
                warn!(id = ?record.text("id"), "Record has no DOI, skipping its files");
                summary.skipped += record.files().len();
                continue;
            };
            for file in record.files() {
                let label = format!("{doi}/{}", file.name);
                let outcome = match self.download_file(&doi, &file).await {
                    Ok(outcome) => outcome,
                    Err(e) => FileOutcome::Failed(e.to_string()),
                };
                if let FileOutcome::Failed(reason) = &outcome {
                    error!(file = %label, reason = %reason, "Download failed");
                }
                summary.record(label, outcome);
            }
        }
        info!(
            downloaded = summary.downloaded,
            present = summary.present,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "Download finished"
        );
        summary
    }

    pub fn destination(&self, doi: &str, file: &FileRef) -> PathBuf {
        self.root.join(doi).join(&file.name)
    }

    pub async fn download_file(&self, doi: &str, file: &FileRef) -> anyhow::Result<FileOutcome> {
        if file.is_link_only {
            return Ok(FileOutcome::Skipped("link-only file".to_string()));
        }
        let Some(url) = file.download_url.as_deref() else {
            return Ok(FileOutcome::Skipped("no download URL".to_string()));
        };
        if file.has_conflicting_checksums() {
            warn!(
                doi,
                file = %file.name,
                computed = ?file.computed_md5,
                supplied = ?file.supplied_md5,
                "Computed and supplied checksums differ, verifying against the computed one"
            );
        }
        let expected = file.declared_checksum();
        let dest = self.destination(doi, file);

        if dest.exists() {
            if let Some(expected) = expected {
                match verify_file_checksum(&dest, expected, ChecksumAlgorithm::Md5) {
                    Ok(()) => {
                        debug!(path = %dest.display(), "Local copy matches, skipping");
                        return Ok(FileOutcome::AlreadyPresent);
                    },
                    Err(EmlxError::ChecksumMismatch { actual, .. }) => {
                        info!(path = %dest.display(), local = %actual, "Local copy differs from declared checksum, downloading again");
                    },
                    Err(e) => return Err(e.into()),
                }
            }
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut previous: Option<Received> = None;
        let mut last_problem = String::from("no attempts made");
        for attempt in 1..=self.settings.max_attempts.max(1) {
            let received = match self.fetch(url, &dest).await {
                Ok(received) => received,
                Err(e) if e.is_permanent() => return Ok(FileOutcome::Failed(e.to_string())),
                Err(e) => {
                    warn!(url, attempt, error = %e, "Download attempt failed");
                    last_problem = e.to_string();
                    previous = None;
                    continue;
                },
            };

            let size_ok = file.size == 0 || received.size == file.size;
            let md5_ok = expected.is_none_or(|e| e.eq_ignore_ascii_case(&received.md5));
            if size_ok && md5_ok {
                info!(path = %dest.display(), attempt, size = received.size, "Downloaded");
                return Ok(FileOutcome::Downloaded { attempts: attempt });
            }

            last_problem = format!(
                "expected {} bytes with MD5 {}, got {} bytes with MD5 {}",
                file.size,
                expected.unwrap_or("(none)"),
                received.size,
                received.md5
            );
            warn!(url, attempt, problem = %last_problem, "Downloaded content does not match");

            if let Some(prev) = &previous {
                if !md5_ok && prev.md5 == received.md5 {
                    return Ok(FileOutcome::Failed(format!("same wrong checksum twice: {last_problem}")));
                }
                if !size_ok && prev.size == received.size {
                    return Ok(FileOutcome::Failed(format!("same wrong size twice: {last_problem}")));
                }
            }
            previous = Some(received);
        }
        Ok(FileOutcome::Failed(last_problem))
    }

    /// Stream `url` to `dest` through a temporary file, hashing on the way
    async fn fetch(&self, url: &str, dest: &Path) -> Result<Received, DownloadError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        let pb = self.progress(response.content_length(), dest);
        let mut partial = dest.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);
        let mut out = tokio::fs::File::create(&partial).await?;
        let mut context = md5::Context::new();
        let mut size = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            context.consume(&chunk);
            out.write_all(&chunk).await?;
            size += chunk.len() as u64;
            pb.set_position(size);
        }
        out.flush().await?;
        drop(out);
        tokio::fs::rename(&partial, dest).await?;
        pb.finish_and_clear();

        Ok(Received {
            size,
            md5: format!("{:x}", context.compute()),
        })
    }

    fn progress(&self, total: Option<u64>, dest: &Path) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total.unwrap_or(0));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        pb.set_message(format!("Downloading {name}"));
        pb
    }
}
