//! Package upload orchestration
//!
//! Each dataset moves through
//!
//! ```text
//! Pending -> FilesUploaded -> MetadataUploaded -> PackageComplete
//!    \______________\_______________\___________-> Failed(reason)
//! ```
//!
//! Local files are resolved and checksummed before any network call. Every
//! successful create is written to the ledger immediately, so an
//! interrupted run resumes where it stopped. A replaced metadata document
//! or resource map is linked to its successor only after the successor
//! exists on the node. One dataset failing never stops the batch.

use crate::eml::{read_entity_ids, read_package_id, to_xml_string, DocumentBuilder};
use crate::error::{ImportError, Result};
use crate::ledger::{ArtifactKind, ArtifactRecord, Ledger};
use crate::member_node::endpoints::resolve_url;
use crate::member_node::{AccessPolicy, AccessSettings, MemberNode, ServiceError, SystemMetadata};
use crate::minter::IdentifierMinter;
use crate::report::RunReport;
use crate::resource_map::ResourceMap;
use chrono::Utc;
use emlx_common::checksum::{compute_file_checksum, md5_hex, ChecksumAlgorithm};
use emlx_common::formats::{format_id_for, EML_FORMAT_ID, RESOURCE_MAP_FORMAT_ID};
use emlx_common::layout::{pathify, DataRoot, LocalFile};
use emlx_common::types::{FileRef, SourceRecord};
use indicatif::ProgressBar;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Where a dataset is in the upload sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageState {
    Pending,
    FilesUploaded,
    MetadataUploaded,
    PackageComplete,
    Failed(String),
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageState::Pending => write!(f, "PENDING"),
            PackageState::FilesUploaded => write!(f, "FILES_UPLOADED"),
            PackageState::MetadataUploaded => write!(f, "METADATA_UPLOADED"),
            PackageState::PackageComplete => write!(f, "PACKAGE_COMPLETE"),
            PackageState::Failed(reason) => write!(f, "FAILED({reason})"),
        }
    }
}

fn advance(dataset: &str, state: &mut PackageState, next: PackageState) {
    debug!(dataset, from = %state, to = %next, "Package state change");
    *state = next;
}

/// Operator cancellation, checked between datasets
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Identity and permissions stamped on every uploaded object
#[derive(Debug, Clone)]
pub struct PackageSettings {
    pub rights_holder: String,
    pub node_id: String,
    pub cn_url: String,
    pub access: AccessSettings,
}

/// Mutable state shared by every dataset in a run
#[derive(Debug)]
pub struct ImportContext {
    pub ledger: Ledger,
    pub ledger_path: PathBuf,
    pub minter: IdentifierMinter,
    pub data_root: DataRoot,
    pub cancel: CancelFlag,
}

impl ImportContext {
    /// Load the ledger and set up a fresh minter
    pub fn open(ledger_path: PathBuf, data_root: DataRoot, cancel: CancelFlag) -> Result<Self> {
        let ledger = Ledger::load(&ledger_path)?;
        Ok(Self {
            ledger,
            ledger_path,
            minter: IdentifierMinter::new(),
            data_root,
            cancel,
        })
    }

    pub fn save_ledger(&mut self) -> Result<()> {
        self.ledger.save(&self.ledger_path)
    }
}

/// Final identifiers of a completed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutcome {
    pub dataset: String,
    pub package_id: String,
    pub metadata_id: String,
    pub resource_map_id: String,
    pub data_ids: Vec<String>,
    pub state: PackageState,
}

struct LocalEntry {
    path: PathBuf,
    checksum: String,
    file: FileRef,
}

/// Drives datasets through the upload sequence against one member node
pub struct Orchestrator<N> {
    node: N,
    builder: DocumentBuilder,
    settings: PackageSettings,
    ctx: ImportContext,
    progress: ProgressBar,
}

impl<N: MemberNode> Orchestrator<N> {
    pub fn new(node: N, builder: DocumentBuilder, settings: PackageSettings, ctx: ImportContext) -> Self {
        Self {
            node,
            builder,
            settings,
            ctx,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn context(&self) -> &ImportContext {
        &self.ctx
    }

    pub fn into_context(self) -> ImportContext {
        self.ctx
    }

    /// Process every record, isolating failures per dataset
    pub async fn run_batch(&mut self, records: &[SourceRecord]) -> RunReport {
        let mut report = RunReport::new();
        info!(datasets = records.len(), "Starting package upload");

        for (index, record) in records.iter().enumerate() {
            if self.ctx.cancel.is_cancelled() {
                report.cancelled = true;
                report.not_attempted = records.len() - index;
                warn!(remaining = report.not_attempted, "Run cancelled, stopping before next dataset");
                break;
            }

            let label = record
                .dataset_id()
                .unwrap_or_else(|| format!("record #{}", index + 1));
            self.progress.set_message(label.clone());
            match self.process_record(record, &mut report).await {
                Ok(outcome) => {
                    info!(dataset = %label, metadata = %outcome.metadata_id, "Package complete");
                    report.succeeded(label);
                },
                Err(e) => {
                    error!(dataset = %label, error = %e, "Dataset failed");
                    report.failed(label, e.to_string());
                },
            }
            self.progress.inc(1);
        }

        if let Err(e) = self.ctx.save_ledger() {
            error!(error = %e, "Could not save ledger at end of run");
        }
        report
    }

    /// Take one record from `Pending` to `PackageComplete`
    pub async fn process_record(&mut self, record: &SourceRecord, report: &mut RunReport) -> Result<PackageOutcome> {
        let dataset = record
            .dataset_id()
            .ok_or_else(|| ImportError::validation("<unknown>", "record has neither doi nor id"))?;
        let mut state = PackageState::Pending;
        let result = self.advance_package(&dataset, record, &mut state, report).await;
        if let Err(e) = &result {
            advance(&dataset, &mut state, PackageState::Failed(e.to_string()));
        }
        result
    }

    async fn advance_package(
        &mut self,
        dataset: &str,
        record: &SourceRecord,
        state: &mut PackageState,
        report: &mut RunReport,
    ) -> Result<PackageOutcome> {
        let title = record.title().unwrap_or_else(|| dataset.to_string());
        let package_id = self.package_id(dataset, record);

        // required elements do not depend on uploaded files, so check before any network call
        let mut bare = record.clone();
        bare.set_files(&[])?;
        self.builder.build_validated(&bare, &package_id)?;
        self.ctx
            .data_root
            .write_json(dataset, &title, &serde_json::to_value(record)?)?;

        let local = self.resolve_local_files(dataset, record)?;
        let files = self.upload_data_files(dataset, local, report).await?;
        advance(dataset, state, PackageState::FilesUploaded);

        let mut enriched = record.clone();
        enriched.set_files(&files)?;
        let doc = self.builder.build_validated(&enriched, &package_id)?;
        let xml = to_xml_string(&doc)?;
        self.ctx.data_root.write_xml(dataset, &title, &xml)?;

        let metadata_name = format!("{}.xml", pathify(&title));
        let metadata = self
            .publish_metadata(dataset, xml.as_bytes(), &metadata_name, report)
            .await?;
        advance(dataset, state, PackageState::MetadataUploaded);

        let mut distinct = HashSet::new();
        let data_ids: Vec<String> = files
            .iter()
            .filter_map(|f| f.remote_identifier.clone())
            .filter(|id| distinct.insert(id.clone()))
            .collect();
        let resource_map = self
            .publish_resource_map(dataset, &metadata.identifier, &data_ids, report)
            .await?;
        advance(dataset, state, PackageState::PackageComplete);

        Ok(PackageOutcome {
            dataset: dataset.to_string(),
            package_id,
            metadata_id: metadata.identifier,
            resource_map_id: resource_map.identifier,
            data_ids,
            state: state.clone(),
        })
    }

    fn package_id(&mut self, dataset: &str, record: &SourceRecord) -> String {
        if let Some(existing) = self.ctx.ledger.package_id(dataset) {
            let existing = existing.to_string();
            self.ctx.minter.reserve(&existing);
            return existing;
        }
        let minted = self.ctx.minter.package_id(record);
        self.ctx.ledger.set_package_id(dataset, &minted);
        minted
    }

    /// Find and checksum every local file, failing on content that does not match its declaration
    fn resolve_local_files(&self, dataset: &str, record: &SourceRecord) -> Result<Vec<LocalEntry>> {
        let mut entries = Vec::new();
        for file in record.files() {
            if file.is_link_only {
                debug!(dataset, file = %file.name, "Skipping link-only file");
                continue;
            }
            if file.has_conflicting_checksums() {
                warn!(
                    dataset,
                    file = %file.name,
                    computed = ?file.computed_md5,
                    supplied = ?file.supplied_md5,
                    "Source repository reports two different checksums"
                );
            }

            match self.ctx.data_root.resolve_file(dataset, &file.name) {
                LocalFile::Direct(path) => {
                    let checksum = compute_file_checksum(&path, ChecksumAlgorithm::Md5)?;
                    let matches_declaration = [&file.computed_md5, &file.supplied_md5]
                        .into_iter()
                        .flatten()
                        .any(|declared| declared.eq_ignore_ascii_case(&checksum));
                    if let Some(expected) = file.declared_checksum() {
                        if !matches_declaration {
                            return Err(ImportError::checksum_mismatch(&file.name, expected, checksum));
                        }
                    }
                    entries.push(LocalEntry { path, checksum, file });
                },
                LocalFile::Extracted(paths) => {
                    info!(dataset, archive = %file.name, files = paths.len(), "Uploading extracted archive contents");
                    for path in paths {
                        let checksum = compute_file_checksum(&path, ChecksumAlgorithm::Md5)?;
                        let size = std::fs::metadata(&path)?.len();
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        entries.push(LocalEntry {
                            path,
                            checksum,
                            file: FileRef::new(name, size),
                        });
                    }
                },
                LocalFile::Missing => {
                    warn!(dataset, file = %file.name, "File not found locally");
                },
            }
        }

        // one data object per distinct content; the first file wins
        let mut seen: HashMap<String, String> = HashMap::new();
        entries.retain(|entry| match seen.get(&entry.checksum) {
            Some(first) => {
                warn!(
                    dataset,
                    file = %entry.file.name,
                    duplicate_of = %first,
                    "Identical content already in this package, skipping"
                );
                false
            },
            None => {
                seen.insert(entry.checksum.clone(), entry.file.name.clone());
                true
            },
        });

        if entries.is_empty() {
            return Err(ImportError::NoLocalFiles {
                dataset: dataset.to_string(),
                dir: self.ctx.data_root.dataset_dir(dataset),
            });
        }
        Ok(entries)
    }

    async fn upload_data_files(
        &mut self,
        dataset: &str,
        entries: Vec<LocalEntry>,
        report: &mut RunReport,
    ) -> Result<Vec<FileRef>> {
        let mut files = Vec::with_capacity(entries.len());
        for LocalEntry {
            path,
            checksum,
            mut file,
        } in entries
        {
            if let Some(existing) = self.ctx.ledger.file(dataset, &checksum) {
                debug!(dataset, file = %file.name, pid = %existing.identifier, "Already uploaded");
                file.remote_identifier = Some(existing.identifier.clone());
                file.remote_url = Some(existing.url.clone());
                files.push(file);
                continue;
            }

            let bytes = tokio::fs::read(&path).await?;
            let format_id = format_id_for(&file.name);
            let pid = self.ctx.minter.mint();
            let sysmeta = self.system_metadata(&pid, format_id, bytes.len() as u64, &checksum, &file.name);
            let identifier = self.create(&pid, &bytes, &sysmeta, report).await?;

            let url = resolve_url(&self.settings.cn_url, &identifier);
            info!(dataset, file = %file.name, pid = %identifier, "Uploaded data file");
            self.ctx.ledger.record_file(
                dataset,
                ArtifactRecord {
                    filename: file.name.clone(),
                    size: bytes.len() as u64,
                    identifier: identifier.clone(),
                    checksum,
                    format_id: format_id.to_string(),
                    url: url.clone(),
                    uploaded: Utc::now(),
                    members: Vec::new(),
                },
            );
            self.ctx.save_ledger()?;

            file.remote_identifier = Some(identifier);
            file.remote_url = Some(url);
            files.push(file);
        }
        Ok(files)
    }

    async fn create(
        &self,
        pid: &str,
        bytes: &[u8],
        sysmeta: &SystemMetadata,
        report: &mut RunReport,
    ) -> std::result::Result<String, ServiceError> {
        match self.node.create(pid, bytes, sysmeta).await {
            Ok(identifier) => {
                report.uploads_succeeded += 1;
                Ok(identifier)
            },
            Err(e) => {
                report.uploads_failed += 1;
                Err(e)
            },
        }
    }

    fn system_metadata(&self, pid: &str, format_id: &str, size: u64, md5: &str, file_name: &str) -> SystemMetadata {
        SystemMetadata::new(pid, format_id, size, md5)
            .owned_by(&self.settings.rights_holder)
            .on_node(&self.settings.node_id)
            .with_access(AccessPolicy::from_settings(&self.settings.access))
            .with_file_name(file_name)
    }

    /// Upload a metadata document unless the ledger already holds identical content
    async fn publish_metadata(
        &mut self,
        dataset: &str,
        bytes: &[u8],
        file_name: &str,
        report: &mut RunReport,
    ) -> Result<ArtifactRecord> {
        let kind = ArtifactKind::Metadata;
        let checksum = md5_hex(bytes);
        if let Some(current) = self.ctx.ledger.current(dataset, kind) {
            if current.checksum == checksum {
                info!(dataset, pid = %current.identifier, "Metadata unchanged, not re-uploading");
                let current = current.clone();
                self.settle_obsoletions(dataset, kind).await?;
                return Ok(current);
            }
        }

        let pid = self.ctx.minter.mint();
        self.upload_artifact(dataset, kind, pid, bytes, file_name, EML_FORMAT_ID, Vec::new(), report)
            .await
    }

    /// Upload a resource map unless the current one already aggregates the same members
    async fn publish_resource_map(
        &mut self,
        dataset: &str,
        metadata_id: &str,
        data_ids: &[String],
        report: &mut RunReport,
    ) -> Result<ArtifactRecord> {
        let map_id = self.ctx.minter.mint_resource_map();
        let map = ResourceMap {
            map_id: &map_id,
            metadata_id,
            data_ids,
            cn_url: &self.settings.cn_url,
            modified: Utc::now(),
        };
        let members = map.members();
        if let Some(current) = self.ctx.ledger.current(dataset, ArtifactKind::ResourceMap) {
            if current.members == members {
                info!(dataset, pid = %current.identifier, "Resource map unchanged, not re-uploading");
                let current = current.clone();
                self.settle_obsoletions(dataset, ArtifactKind::ResourceMap).await?;
                return Ok(current);
            }
        }

        let xml = map.to_xml()?;
        let file_name = format!("{}.rdf.xml", dataset.replace('/', "_"));
        self.upload_artifact(
            dataset,
            ArtifactKind::ResourceMap,
            map_id,
            xml.as_bytes(),
            &file_name,
            RESOURCE_MAP_FORMAT_ID,
            members,
            report,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_artifact(
        &mut self,
        dataset: &str,
        kind: ArtifactKind,
        pid: String,
        bytes: &[u8],
        file_name: &str,
        format_id: &str,
        members: Vec<String>,
        report: &mut RunReport,
    ) -> Result<ArtifactRecord> {
        let checksum = md5_hex(bytes);
        let sysmeta = self.system_metadata(&pid, format_id, bytes.len() as u64, &checksum, file_name);
        let identifier = self.create(&pid, bytes, &sysmeta, report).await?;
        info!(dataset, ?kind, pid = %identifier, "Uploaded package object");

        let record = ArtifactRecord {
            filename: file_name.to_string(),
            size: bytes.len() as u64,
            url: resolve_url(&self.settings.cn_url, &identifier),
            identifier,
            checksum,
            format_id: format_id.to_string(),
            uploaded: Utc::now(),
            members,
        };
        self.ctx.ledger.replace(dataset, kind, record.clone());
        self.ctx.save_ledger()?;

        self.settle_obsoletions(dataset, kind).await?;
        Ok(record)
    }

    /// Link every superseded object of `kind` to its successor
    async fn settle_obsoletions(&mut self, dataset: &str, kind: ArtifactKind) -> Result<()> {
        for (old, new) in self.ctx.ledger.pending_obsoletions(dataset, kind) {
            self.link_obsolescence(&old, &new).await?;
            self.ctx.ledger.mark_obsoleted(dataset, &old, &new);
            self.ctx.save_ledger()?;
            info!(dataset, ?kind, old = %old, new = %new, "Linked obsoleted object");
        }
        Ok(())
    }

    /// Set `obsoletedBy` on the old object and `obsoletes` on the new one
    pub async fn link_obsolescence(&self, old: &str, new: &str) -> Result<()> {
        let mut old_meta = self.node.get_system_metadata(old).await?;
        let mut new_meta = self.node.get_system_metadata(new).await?;

        if old_meta.obsoleted_by.as_deref() != Some(new) {
            old_meta.obsoleted_by = Some(new.to_string());
            self.node.update_system_metadata(old, &old_meta).await?;
        }
        if new_meta.obsoletes.as_deref() != Some(old) {
            new_meta.obsoletes = Some(old.to_string());
            self.node.update_system_metadata(new, &new_meta).await?;
        }
        Ok(())
    }

    /// Upload every `*.xml` EML document in a directory as its own package
    pub async fn upload_eml_folder(&mut self, dir: &Path) -> Result<RunReport> {
        if !dir.is_dir() {
            return Err(ImportError::FileNotFound(dir.to_path_buf()));
        }
        let paths: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
            })
            .collect();
        info!(dir = %dir.display(), documents = paths.len(), "Uploading EML documents");

        let mut report = RunReport::new();
        for (index, path) in paths.iter().enumerate() {
            if self.ctx.cancel.is_cancelled() {
                report.cancelled = true;
                report.not_attempted = paths.len() - index;
                break;
            }
            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.process_eml_file(path, &mut report).await {
                Ok(dataset) => report.succeeded(dataset),
                Err(e) => {
                    error!(file = %label, error = %e, "EML document failed");
                    report.failed(label, e.to_string());
                },
            }
            self.progress.inc(1);
        }

        if let Err(e) = self.ctx.save_ledger() {
            error!(error = %e, "Could not save ledger at end of run");
        }
        Ok(report)
    }

    async fn process_eml_file(&mut self, path: &Path, report: &mut RunReport) -> Result<String> {
        let xml = tokio::fs::read_to_string(path).await?;
        let package_id = read_package_id(&xml)?;
        let dataset = package_id
            .strip_prefix("doi:")
            .unwrap_or(&package_id)
            .to_string();
        let data_ids = read_entity_ids(&xml)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.xml", pathify(&dataset)));

        let metadata = self
            .publish_metadata(&dataset, xml.as_bytes(), &file_name, report)
            .await?;
        self.publish_resource_map(&dataset, &metadata.identifier, &data_ids, report)
            .await?;
        Ok(dataset)
    }
}
