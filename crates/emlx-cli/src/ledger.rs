//! Upload ledger
//!
//! Durable record of what has already reached the member node, keyed by
//! dataset and then by content checksum. A re-run consults it before any
//! network call, so only missing or changed artifacts are sent. The file
//! is rewritten atomically after every successful upload.
//!
//! Superseded metadata documents and resource maps are kept with the
//! identifier that obsoleted them. An entry still waiting for that link
//! is retried on the next run.

use crate::error::{ImportError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const LEDGER_VERSION: u32 = 1;

/// What an uploaded object is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Data,
    Metadata,
    ResourceMap,
}

/// One uploaded object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub filename: String,
    pub size: u64,
    pub identifier: String,
    /// MD5, lowercase hex
    pub checksum: String,
    pub format_id: String,
    /// Resolve URL on the coordinating node
    pub url: String,
    pub uploaded: DateTime<Utc>,
    /// Identifiers aggregated by a resource map
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

/// A metadata document or resource map replaced by a newer upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Superseded {
    pub kind: ArtifactKind,
    #[serde(flatten)]
    pub record: ArtifactRecord,
    /// Set once the obsolescence link exists on the member node
    #[serde(default)]
    pub obsoleted_by: Option<String>,
}

/// Everything uploaded for one dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetUploads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    /// Data files by checksum
    #[serde(default)]
    pub files: BTreeMap<String, ArtifactRecord>,
    #[serde(default)]
    pub metadata: Option<ArtifactRecord>,
    #[serde(default)]
    pub resource_map: Option<ArtifactRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub superseded: Vec<Superseded>,
}

impl DatasetUploads {
    pub fn current(&self, kind: ArtifactKind) -> Option<&ArtifactRecord> {
        match kind {
            ArtifactKind::Metadata => self.metadata.as_ref(),
            ArtifactKind::ResourceMap => self.resource_map.as_ref(),
            ArtifactKind::Data => None,
        }
    }

    fn slot(&mut self, kind: ArtifactKind) -> Option<&mut Option<ArtifactRecord>> {
        match kind {
            ArtifactKind::Metadata => Some(&mut self.metadata),
            ArtifactKind::ResourceMap => Some(&mut self.resource_map),
            ArtifactKind::Data => None,
        }
    }

    /// Mutable access to every record, for repair passes
    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut ArtifactRecord> {
        self.files
            .values_mut()
            .chain(self.metadata.iter_mut())
            .chain(self.resource_map.iter_mut())
            .chain(self.superseded.iter_mut().map(|s| &mut s.record))
    }
}

/// Upload ledger for one member node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub ledger_version: u32,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetUploads>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            ledger_version: LEDGER_VERSION,
            updated: Utc::now(),
            datasets: BTreeMap::new(),
        }
    }

    /// Ledger file for a node inside the work directory
    pub fn path_for(work_dir: &Path, node_id: &str) -> PathBuf {
        let name: String = node_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        work_dir.join(format!("{name}.json"))
    }

    /// Load from disk
    ///
    /// A missing file is an empty ledger. An unreadable one is moved aside
    /// to `<path>.corrupt-<timestamp>` and replaced by an empty ledger.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No ledger yet, starting empty");
                return Ok(Self::new());
            },
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Ledger>(&content) {
            Ok(ledger) => {
                info!(path = %path.display(), datasets = ledger.datasets.len(), "Loaded ledger");
                Ok(ledger)
            },
            Err(e) => {
                let backup = path.with_extension(format!("json.corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S")));
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "Ledger is unreadable, moving it aside and starting empty"
                );
                if let Err(e) = std::fs::rename(path, &backup) {
                    warn!(path = %path.display(), error = %e, "Could not move corrupt ledger aside");
                }
                Ok(Self::new())
            },
        }
    }

    /// Write atomically: a temp file in the same directory, then rename
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated = Utc::now();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let content = serde_json::to_string_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| ImportError::ledger(format!("cannot replace '{}': {}", path.display(), e.error)))?;
        debug!(path = %path.display(), "Saved ledger");
        Ok(())
    }

    pub fn dataset(&self, dataset: &str) -> Option<&DatasetUploads> {
        self.datasets.get(dataset)
    }

    fn entry(&mut self, dataset: &str) -> &mut DatasetUploads {
        self.datasets.entry(dataset.to_string()).or_default()
    }

    /// Whether a data file with this checksum is already uploaded
    pub fn has(&self, dataset: &str, checksum: &str) -> bool {
        self.file(dataset, checksum).is_some()
    }

    pub fn file(&self, dataset: &str, checksum: &str) -> Option<&ArtifactRecord> {
        self.datasets.get(dataset)?.files.get(&checksum.to_ascii_lowercase())
    }

    pub fn record_file(&mut self, dataset: &str, record: ArtifactRecord) {
        let key = record.checksum.to_ascii_lowercase();
        self.entry(dataset).files.insert(key, record);
    }

    pub fn current(&self, dataset: &str, kind: ArtifactKind) -> Option<&ArtifactRecord> {
        self.datasets.get(dataset)?.current(kind)
    }

    /// Store a new metadata document or resource map, returning the one it replaces
    ///
    /// The replaced record moves to the superseded list, pending its
    /// obsolescence link.
    pub fn replace(&mut self, dataset: &str, kind: ArtifactKind, record: ArtifactRecord) -> Option<ArtifactRecord> {
        let uploads = self.entry(dataset);
        let previous = uploads.slot(kind)?.replace(record);
        if let Some(previous) = &previous {
            uploads.superseded.push(Superseded {
                kind,
                record: previous.clone(),
                obsoleted_by: None,
            });
        }
        previous
    }

    /// `(old, successor)` pairs of `kind` that still lack their obsolescence link
    ///
    /// Superseded entries form a chain in upload order that ends at the
    /// current record, so each one is linked to the entry after it.
    pub fn pending_obsoletions(&self, dataset: &str, kind: ArtifactKind) -> Vec<(String, String)> {
        let Some(uploads) = self.datasets.get(dataset) else {
            return Vec::new();
        };
        let Some(current) = uploads.current(kind) else {
            return Vec::new();
        };
        let chain: Vec<&Superseded> = uploads.superseded.iter().filter(|s| s.kind == kind).collect();
        chain
            .iter()
            .enumerate()
            .filter(|(_, s)| s.obsoleted_by.is_none())
            .map(|(i, s)| {
                let successor = chain
                    .get(i + 1)
                    .map(|next| next.record.identifier.clone())
                    .unwrap_or_else(|| current.identifier.clone());
                (s.record.identifier.clone(), successor)
            })
            .collect()
    }

    pub fn mark_obsoleted(&mut self, dataset: &str, old: &str, new: &str) {
        if let Some(uploads) = self.datasets.get_mut(dataset) {
            for entry in uploads.superseded.iter_mut().filter(|s| s.record.identifier == old) {
                entry.obsoleted_by = Some(new.to_string());
            }
        }
    }

    pub fn package_id(&self, dataset: &str) -> Option<&str> {
        self.datasets.get(dataset)?.package_id.as_deref()
    }

    pub fn set_package_id(&mut self, dataset: &str, package_id: &str) {
        self.entry(dataset).package_id = Some(package_id.to_string());
    }

    /// Every record in the ledger, for repair passes
    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut ArtifactRecord> {
        self.datasets.values_mut().flat_map(DatasetUploads::records_mut)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
