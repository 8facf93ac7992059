//! On-disk layout of the data root
//!
//! Each dataset lives in `<root>/<doi>/`. Version chains are stored under
//! the DOI of whichever version was downloaded, so a lookup for `….v3` falls
//! back to `….v2`, `….v1` and so on when the exact directory is missing.

use crate::error::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Maximum length of a file stem derived from a title
pub const MAX_STEM_CHARS: usize = 48;

#[allow(clippy::expect_used)]
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("static pattern"));

/// Turn a dataset title into a file stem
pub fn pathify(title: &str) -> String {
    NON_WORD
        .replace_all(title, "")
        .replace(' ', "_")
        .chars()
        .take(MAX_STEM_CHARS)
        .collect()
}

/// Root directory holding one sub-directory per dataset
#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory for a DOI, falling back to earlier versions
    ///
    /// Returns the exact path when no version exists on disk.
    pub fn dataset_dir(&self, doi: &str) -> PathBuf {
        let exact = self.root.join(doi);
        if exact.exists() {
            return exact;
        }
        debug!(dir = %exact.display(), "Dataset directory missing, trying earlier versions");

        let Some((stem, version)) = doi.rsplit_once(".v") else {
            return exact;
        };
        let Ok(mut version) = version.parse::<u32>() else {
            return exact;
        };
        while version > 0 {
            version -= 1;
            let candidate = self.root.join(format!("{stem}.v{version}"));
            if candidate.exists() {
                info!(doi, found = %candidate.display(), "Using earlier version directory");
                return candidate;
            }
        }
        exact
    }

    /// Write the archived JSON copy of a record, returning its path
    pub fn write_json(&self, doi: &str, title: &str, value: &serde_json::Value) -> Result<PathBuf> {
        let content = serde_json::to_string_pretty(value)?;
        self.write_artifact(doi, title, "json", content.as_bytes())
    }

    /// Write a serialized metadata document, returning its path
    pub fn write_xml(&self, doi: &str, title: &str, xml: &str) -> Result<PathBuf> {
        self.write_artifact(doi, title, "xml", xml.as_bytes())
    }

    fn write_artifact(&self, doi: &str, title: &str, ext: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.dataset_dir(doi);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.{ext}", pathify(title)));
        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), "Wrote {ext} artifact");
        Ok(path)
    }

    /// Where a single named file ended up on disk
    pub fn resolve_file(&self, doi: &str, name: &str) -> LocalFile {
        let dir = self.dataset_dir(doi);
        let path = dir.join(name);
        if path.is_file() {
            return LocalFile::Direct(path);
        }
        let stem = Path::new(name)
            .file_stem()
            .map(|s| dir.join(s))
            .unwrap_or_else(|| dir.join(name));
        if !stem.is_dir() {
            return LocalFile::Missing;
        }
        let extracted: Vec<PathBuf> = WalkDir::new(&stem)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();
        debug!(name, count = extracted.len(), "Using extracted archive contents");
        if extracted.is_empty() {
            LocalFile::Missing
        } else {
            LocalFile::Extracted(extracted)
        }
    }
}

/// Result of looking up one declared file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalFile {
    /// The file itself, under its declared name
    Direct(PathBuf),
    /// Contents of the directory an archive was unpacked into
    Extracted(Vec<PathBuf>),
    Missing,
}
