//! Package upload tests against an in-memory member node
//!
//! These tests cover:
//! - A complete package from a minimal record
//! - Idempotent re-runs
//! - Obsolescence chaining when metadata changes
//! - Failure isolation inside a batch
//! - Duplicate file content within one package
//! - Checksum verification before any upload
//! - Cancellation, metadata-only packages and the repair passes

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use emlx_cli::eml::{Crosswalk, DocumentBuilder, EmlSettings};
use emlx_cli::ledger::{ArtifactKind, ArtifactRecord, Ledger};
use emlx_cli::member_node::{
    AccessPolicy, AccessSettings, MemberNode, ObjectInfo, ObjectList, ServiceError, SystemMetadata,
};
use emlx_cli::orchestrator::{CancelFlag, ImportContext, Orchestrator, PackageSettings, PackageState};
use emlx_cli::rectify::{fix_access, rectify};
use emlx_cli::report::RunReport;
use emlx_common::checksum::md5_hex;
use emlx_common::formats::{EML_FORMAT_ID, RESOURCE_MAP_FORMAT_ID};
use emlx_common::layout::DataRoot;
use emlx_common::types::SourceRecord;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const DOI: &str = "10.25573/data.1000.v1";
const OTHER_DOI: &str = "10.25573/data.2000.v1";
const CSV: &[u8] = b"site,count\nA,12\nB,7\n";

// ============================================================================
// In-memory member node
// ============================================================================

#[derive(Default)]
struct NodeState {
    objects: BTreeMap<String, (Vec<u8>, SystemMetadata)>,
    /// `create:<pid>` and `update:<pid>` in call order
    events: Vec<String>,
    reject_files: HashSet<String>,
}

#[derive(Clone, Default)]
struct FakeNode(Arc<Mutex<NodeState>>);

impl FakeNode {
    fn reject(&self, file_name: &str) {
        self.0.lock().unwrap().reject_files.insert(file_name.to_string());
    }

    fn created(&self) -> Vec<String> {
        self.events("create:")
    }

    fn updated(&self) -> Vec<String> {
        self.events("update:")
    }

    fn events(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .events
            .iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    fn position(&self, event: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .events
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("no event {event}"))
    }

    fn sysmeta(&self, pid: &str) -> SystemMetadata {
        self.0.lock().unwrap().objects[pid].1.clone()
    }

    fn object(&self, pid: &str) -> String {
        String::from_utf8(self.0.lock().unwrap().objects[pid].0.clone()).unwrap()
    }

    fn insert(&self, sysmeta: SystemMetadata) {
        self.0
            .lock()
            .unwrap()
            .objects
            .insert(sysmeta.identifier.clone(), (Vec::new(), sysmeta));
    }
}

#[async_trait]
impl MemberNode for FakeNode {
    async fn create(&self, pid: &str, object: &[u8], sysmeta: &SystemMetadata) -> Result<String, ServiceError> {
        let mut state = self.0.lock().unwrap();
        if let Some(name) = &sysmeta.file_name {
            if state.reject_files.contains(name) {
                return Err(ServiceError::permanent("create", format!("InvalidRequest: {name} rejected")));
            }
        }
        if state.objects.contains_key(pid) {
            return Err(ServiceError::permanent("create", format!("IdentifierNotUnique: {pid}")));
        }
        state.objects.insert(pid.to_string(), (object.to_vec(), sysmeta.clone()));
        state.events.push(format!("create:{pid}"));
        Ok(pid.to_string())
    }

    async fn get_system_metadata(&self, pid: &str) -> Result<SystemMetadata, ServiceError> {
        let state = self.0.lock().unwrap();
        state
            .objects
            .get(pid)
            .map(|(_, meta)| meta.clone())
            .ok_or_else(|| ServiceError::permanent("getSystemMetadata", format!("NotFound: {pid}")))
    }

    async fn update_system_metadata(&self, pid: &str, sysmeta: &SystemMetadata) -> Result<(), ServiceError> {
        let mut state = self.0.lock().unwrap();
        let Some(entry) = state.objects.get_mut(pid) else {
            return Err(ServiceError::permanent("updateSystemMetadata", format!("NotFound: {pid}")));
        };
        entry.1 = sysmeta.clone();
        state.events.push(format!("update:{pid}"));
        Ok(())
    }

    async fn list_objects(
        &self,
        start: u32,
        count: u32,
        _from_date: Option<DateTime<Utc>>,
    ) -> Result<ObjectList, ServiceError> {
        let state = self.0.lock().unwrap();
        let objects: Vec<ObjectInfo> = state
            .objects
            .values()
            .skip(start as usize)
            .take(count as usize)
            .map(|(bytes, meta)| ObjectInfo {
                identifier: meta.identifier.clone(),
                format_id: meta.format_id.clone(),
                checksum: meta.checksum.clone(),
                date_sys_metadata_modified: meta.date_sys_metadata_modified.clone(),
                size: bytes.len() as u64,
            })
            .collect();
        Ok(ObjectList {
            count: objects.len() as u32,
            start,
            total: state.objects.len() as u32,
            objects,
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    dir: TempDir,
    node: FakeNode,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            node: FakeNode::default(),
        }
    }

    fn data_root(&self) -> DataRoot {
        DataRoot::new(self.dir.path().join("data"))
    }

    fn ledger_path(&self) -> std::path::PathBuf {
        Ledger::path_for(&self.dir.path().join("work"), "urn:node:TEST")
    }

    fn write_file(&self, doi: &str, name: &str, bytes: &[u8]) {
        let dir = self.dir.path().join("data").join(doi);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), bytes).unwrap();
    }

    fn orchestrator_with(&self, cancel: CancelFlag) -> Orchestrator<FakeNode> {
        let ctx = ImportContext::open(self.ledger_path(), self.data_root(), cancel).unwrap();
        let builder = DocumentBuilder::new(&Crosswalk::figshare(), EmlSettings::default()).unwrap();
        Orchestrator::new(self.node.clone(), builder, settings(), ctx)
    }

    fn orchestrator(&self) -> Orchestrator<FakeNode> {
        self.orchestrator_with(CancelFlag::new())
    }

    async fn run(&self, records: &[SourceRecord]) -> (RunReport, Ledger) {
        let mut orchestrator = self.orchestrator();
        let report = orchestrator.run_batch(records).await;
        (report, orchestrator.into_context().ledger)
    }
}

fn settings() -> PackageSettings {
    PackageSettings {
        rights_holder: "http://orcid.org/0000-0002-1825-0097".to_string(),
        node_id: "urn:node:TEST".to_string(),
        cn_url: "https://cn.example.org/cn".to_string(),
        access: AccessSettings {
            write_groups: vec!["CN=editors,DC=dataone,DC=org".to_string()],
            ..Default::default()
        },
    }
}

fn record(doi: &str, title: &str, files: Value) -> SourceRecord {
    serde_json::from_value(json!({
        "id": 1000,
        "doi": doi,
        "title": title,
        "description": "<p>Monthly bird counts.</p>",
        "published_date": "2021-03-04T12:00:00Z",
        "url_public_html": format!("https://example.figshare.com/articles/{doi}"),
        "authors": [{"full_name": "Jane Q. Smith", "orcid_id": "0000-0002-1825-0097"}],
        "tags": ["birds"],
        "license": {"name": "CC0", "url": "https://creativecommons.org/publicdomain/zero/1.0/"},
        "group_id": 23483,
        "files": files,
    }))
    .unwrap()
}

fn csv_file() -> Value {
    json!([{"name": "counts.csv", "size": CSV.len(), "computed_md5": md5_hex(CSV)}])
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_minimal_record_becomes_complete_package() {
    let h = Harness::new();
    h.write_file(DOI, "counts.csv", CSV);
    let rec = record(DOI, "Bird counts", csv_file());

    let mut orchestrator = h.orchestrator();
    let mut report = RunReport::new();
    let outcome = orchestrator.process_record(&rec, &mut report).await.unwrap();

    assert_eq!(outcome.state, PackageState::PackageComplete);
    assert_eq!(outcome.package_id, format!("doi:{DOI}"));
    assert_eq!(outcome.data_ids.len(), 1);
    assert_eq!(report.uploads_succeeded, 3);

    // data first, then metadata, then the resource map
    let created = h.node.created();
    assert_eq!(created, vec![
        outcome.data_ids[0].clone(),
        outcome.metadata_id.clone(),
        outcome.resource_map_id.clone(),
    ]);

    let data_meta = h.node.sysmeta(&outcome.data_ids[0]);
    assert_eq!(data_meta.format_id, "text/csv");
    assert_eq!(data_meta.checksum.value, md5_hex(CSV));
    assert_eq!(data_meta.rights_holder, "http://orcid.org/0000-0002-1825-0097");
    assert_eq!(data_meta.access_policy, Some(AccessPolicy::from_settings(&settings().access)));

    assert_eq!(h.node.sysmeta(&outcome.metadata_id).format_id, EML_FORMAT_ID);
    let eml = h.node.object(&outcome.metadata_id);
    assert!(eml.contains(&format!("packageId=\"doi:{DOI}\"")));
    assert!(eml.contains(&format!("<otherEntity id=\"{}\">", outcome.data_ids[0])));
    assert!(eml.contains("<pubDate>2021-03-04</pubDate>"));

    assert_eq!(h.node.sysmeta(&outcome.resource_map_id).format_id, RESOURCE_MAP_FORMAT_ID);
    assert!(outcome.resource_map_id.starts_with("resource_map_urn:uuid:"));

    let ledger = &orchestrator.context().ledger;
    assert_eq!(
        ledger.current(DOI, ArtifactKind::Metadata).unwrap().identifier,
        outcome.metadata_id
    );
    assert_eq!(
        ledger.file(DOI, &md5_hex(CSV)).unwrap().url,
        format!(
            "https://cn.example.org/cn/v2/resolve/{}",
            outcome.data_ids[0].replace(':', "%3A")
        )
    );

    // local copies of the record and document
    let dir = h.dir.path().join("data").join(DOI);
    assert!(dir.join("Bird_counts.json").exists());
    assert!(dir.join("Bird_counts.xml").exists());
}

#[tokio::test]
async fn test_rerun_uploads_nothing() {
    let h = Harness::new();
    h.write_file(DOI, "counts.csv", CSV);
    let records = vec![record(DOI, "Bird counts", csv_file())];

    let (first, _) = h.run(&records).await;
    assert_eq!(first.uploads_succeeded, 3);
    assert_eq!(first.packages_succeeded, vec![DOI.to_string()]);

    let (second, ledger) = h.run(&records).await;
    assert_eq!(second.uploads_succeeded, 0);
    assert_eq!(second.packages_succeeded, vec![DOI.to_string()]);
    assert_eq!(h.node.created().len(), 3);
    assert!(h.node.updated().is_empty());
    assert!(ledger.dataset(DOI).unwrap().superseded.is_empty());
}

#[tokio::test]
async fn test_changed_metadata_obsoletes_previous_version() {
    let h = Harness::new();
    h.write_file(DOI, "counts.csv", CSV);

    let (_, ledger) = h.run(&[record(DOI, "Bird counts", csv_file())]).await;
    let old_eml = ledger.current(DOI, ArtifactKind::Metadata).unwrap().identifier.clone();
    let old_map = ledger.current(DOI, ArtifactKind::ResourceMap).unwrap().identifier.clone();

    let (report, ledger) = h.run(&[record(DOI, "Bird counts, revised", csv_file())]).await;
    assert_eq!(report.uploads_succeeded, 2, "data file is unchanged");
    let new_eml = ledger.current(DOI, ArtifactKind::Metadata).unwrap().identifier.clone();
    let new_map = ledger.current(DOI, ArtifactKind::ResourceMap).unwrap().identifier.clone();
    assert_ne!(old_eml, new_eml);
    assert_ne!(old_map, new_map);

    for (old, new) in [(&old_eml, &new_eml), (&old_map, &new_map)] {
        assert_eq!(h.node.sysmeta(old).obsoleted_by.as_deref(), Some(new.as_str()));
        assert_eq!(h.node.sysmeta(new).obsoletes.as_deref(), Some(old.as_str()));
        // the successor exists before anything points at it
        assert!(h.node.position(&format!("create:{new}")) < h.node.position(&format!("update:{old}")));
    }

    let superseded = &ledger.dataset(DOI).unwrap().superseded;
    assert_eq!(superseded.len(), 2);
    assert!(superseded.iter().all(|s| s.obsoleted_by.is_some()));
    // package id survives the new version
    assert!(h.node.object(&new_eml).contains(&format!("packageId=\"doi:{DOI}\"")));
}

#[tokio::test]
async fn test_failed_dataset_does_not_stop_batch() {
    let h = Harness::new();
    h.write_file(OTHER_DOI, "counts.csv", CSV);
    let records = vec![
        record(DOI, "Nothing on disk", csv_file()),
        record(OTHER_DOI, "Bird counts", csv_file()),
    ];

    let (report, ledger) = h.run(&records).await;
    assert_eq!(report.packages_failed.len(), 1);
    assert_eq!(report.packages_failed[0].0, DOI);
    assert!(report.packages_failed[0].1.contains("No local files"));
    assert_eq!(report.packages_succeeded, vec![OTHER_DOI.to_string()]);
    assert!(report.has_failures());
    assert!(ledger.current(DOI, ArtifactKind::Metadata).is_none());
    assert!(ledger.current(OTHER_DOI, ArtifactKind::ResourceMap).is_some());
}

#[tokio::test]
async fn test_checksum_mismatch_fails_before_upload() {
    let h = Harness::new();
    h.write_file(DOI, "counts.csv", b"truncated");
    let (report, _) = h.run(&[record(DOI, "Bird counts", csv_file())]).await;

    assert_eq!(report.packages_failed.len(), 1);
    assert!(report.packages_failed[0].1.contains("Checksum verification failed"));
    assert!(h.node.created().is_empty());
}

#[tokio::test]
async fn test_rejected_data_file_stops_package() {
    let h = Harness::new();
    h.write_file(DOI, "counts.csv", CSV);
    h.node.reject("counts.csv");

    let (report, ledger) = h.run(&[record(DOI, "Bird counts", csv_file())]).await;
    assert_eq!(report.uploads_failed, 1);
    assert_eq!(report.packages_failed.len(), 1);
    assert!(h.node.created().is_empty());
    assert!(ledger.current(DOI, ArtifactKind::Metadata).is_none());
}

#[tokio::test]
async fn test_partial_failure_is_isolated_across_datasets() {
    let h = Harness::new();
    let second = b"site,count\nC,3\n";
    h.write_file(DOI, "a.csv", CSV);
    h.write_file(DOI, "b.csv", second);
    h.write_file(OTHER_DOI, "counts.csv", CSV);
    h.node.reject("b.csv");
    let files = json!([
        {"name": "a.csv", "size": CSV.len(), "computed_md5": md5_hex(CSV)},
        {"name": "b.csv", "size": second.len(), "computed_md5": md5_hex(second)},
    ]);
    let records = vec![record(DOI, "Half uploaded", files), record(OTHER_DOI, "Bird counts", csv_file())];

    let (report, _) = h.run(&records).await;
    assert_eq!(report.packages_failed.len(), 1);
    assert_eq!(report.packages_failed[0].0, DOI);
    assert_eq!(report.packages_succeeded, vec![OTHER_DOI.to_string()]);
    assert_eq!(report.uploads_failed, 1);

    // the file that made it is on disk for the next run
    let saved = Ledger::load(&h.ledger_path()).unwrap();
    assert!(saved.has(DOI, &md5_hex(CSV)));
    assert!(!saved.has(DOI, &md5_hex(second)));
    assert!(saved.current(DOI, ArtifactKind::Metadata).is_none());
    assert!(saved.current(OTHER_DOI, ArtifactKind::ResourceMap).is_some());
}

#[tokio::test]
async fn test_identical_files_become_one_data_object() {
    let h = Harness::new();
    h.write_file(DOI, "a.csv", CSV);
    h.write_file(DOI, "b.csv", CSV);
    let files = json!([
        {"name": "a.csv", "size": CSV.len(), "computed_md5": md5_hex(CSV)},
        {"name": "b.csv", "size": CSV.len(), "computed_md5": md5_hex(CSV)},
    ]);

    let mut orchestrator = h.orchestrator();
    let mut report = RunReport::new();
    let outcome = orchestrator
        .process_record(&record(DOI, "Bird counts twice", files), &mut report)
        .await
        .unwrap();

    assert_eq!(outcome.data_ids.len(), 1);
    assert_eq!(h.node.created().len(), 3);
    assert_eq!(h.node.sysmeta(&outcome.data_ids[0]).file_name.as_deref(), Some("a.csv"));

    let eml = h.node.object(&outcome.metadata_id);
    assert_eq!(eml.matches("<otherEntity ").count(), 1);
    assert!(eml.contains("<entityName>a.csv</entityName>"));

    let map = orchestrator.context().ledger.current(DOI, ArtifactKind::ResourceMap).unwrap();
    let unique: HashSet<&String> = map.members.iter().collect();
    assert_eq!(unique.len(), map.members.len());
}

#[tokio::test]
async fn test_record_without_creator_is_rejected_early() {
    let h = Harness::new();
    h.write_file(DOI, "counts.csv", CSV);
    let mut value = serde_json::to_value(record(DOI, "Bird counts", csv_file())).unwrap();
    value["authors"] = json!([]);
    let rec: SourceRecord = serde_json::from_value(value).unwrap();

    let (report, _) = h.run(&[rec]).await;
    assert!(report.packages_failed[0].1.contains("creator"));
    assert!(h.node.created().is_empty());
}

#[tokio::test]
async fn test_extracted_archive_contents_are_uploaded() {
    let h = Harness::new();
    h.write_file(&format!("{DOI}/images"), "a.png", b"png-a");
    h.write_file(&format!("{DOI}/images"), "b.png", b"png-b");
    let files = json!([{"name": "images.zip", "size": 1234, "computed_md5": "0123456789abcdef0123456789abcdef"}]);

    let (report, ledger) = h.run(&[record(DOI, "Bird images", files)]).await;
    assert_eq!(report.packages_succeeded.len(), 1);
    assert_eq!(report.uploads_succeeded, 4);
    assert!(ledger.has(DOI, &md5_hex(b"png-a")));
    assert!(ledger.has(DOI, &md5_hex(b"png-b")));
    let map = ledger.current(DOI, ArtifactKind::ResourceMap).unwrap();
    assert_eq!(map.members.len(), 3);
}

#[tokio::test]
async fn test_cancelled_run_attempts_nothing() {
    let h = Harness::new();
    h.write_file(DOI, "counts.csv", CSV);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let mut orchestrator = h.orchestrator_with(cancel);
    let report = orchestrator
        .run_batch(&[record(DOI, "Bird counts", csv_file()), record(OTHER_DOI, "More", csv_file())])
        .await;
    assert!(report.cancelled);
    assert_eq!(report.not_attempted, 2);
    assert!(h.node.created().is_empty());
}

#[tokio::test]
async fn test_upload_eml_folder() {
    let h = Harness::new();
    let eml_dir = h.dir.path().join("eml");
    std::fs::create_dir_all(&eml_dir).unwrap();
    std::fs::write(
        eml_dir.join("survey.xml"),
        r#"<?xml version="1.0" encoding="UTF-8"?>
<eml:eml xmlns:eml="https://eml.ecoinformatics.org/eml-2.2.0" packageId="doi:10.5479/si.123" system="https://si.edu">
  <dataset>
    <title>Survey</title>
    <otherEntity id="urn:uuid:existing-data"><entityName>a.csv</entityName><entityType>text/csv</entityType></otherEntity>
  </dataset>
</eml:eml>
"#,
    )
    .unwrap();
    std::fs::write(eml_dir.join("notes.txt"), "not a document").unwrap();

    let mut orchestrator = h.orchestrator();
    let report = orchestrator.upload_eml_folder(&eml_dir).await.unwrap();
    assert_eq!(report.packages_succeeded, vec!["10.5479/si.123".to_string()]);
    assert_eq!(h.node.created().len(), 2);

    let ledger = &orchestrator.context().ledger;
    let metadata = ledger.current("10.5479/si.123", ArtifactKind::Metadata).unwrap();
    let map = ledger.current("10.5479/si.123", ArtifactKind::ResourceMap).unwrap();
    assert_eq!(map.members, vec![metadata.identifier.clone(), "urn:uuid:existing-data".to_string()]);
    assert!(h.node.object(&map.identifier).contains("urn%3Auuid%3Aexisting-data"));
}

#[tokio::test]
async fn test_rectify_fills_missing_identifiers() {
    let node = FakeNode::default();
    let md5 = md5_hex(CSV);
    node.insert(SystemMetadata::new("urn:uuid:remote", "text/csv", CSV.len() as u64, md5.clone()));

    let mut ledger = Ledger::new();
    ledger.record_file(
        DOI,
        ArtifactRecord {
            filename: "counts.csv".to_string(),
            size: CSV.len() as u64,
            identifier: String::new(),
            checksum: md5.clone(),
            format_id: String::new(),
            url: String::new(),
            uploaded: Utc::now(),
            members: Vec::new(),
        },
    );
    ledger.record_file(
        DOI,
        ArtifactRecord {
            filename: "other.csv".to_string(),
            size: 3,
            identifier: String::new(),
            checksum: md5_hex(b"abc"),
            format_id: String::new(),
            url: String::new(),
            uploaded: Utc::now(),
            members: Vec::new(),
        },
    );

    let summary = rectify(&node, &mut ledger, "https://cn.example.org/cn", false).await.unwrap();
    assert_eq!(summary.listed, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.unmatched, 1);

    let entry = ledger.file(DOI, &md5).unwrap();
    assert_eq!(entry.identifier, "urn:uuid:remote");
    assert_eq!(entry.format_id, "text/csv");
    assert_eq!(entry.url, "https://cn.example.org/cn/v2/resolve/urn%3Auuid%3Aremote");

    // a second pass changes nothing
    let again = rectify(&node, &mut ledger, "https://cn.example.org/cn", false).await.unwrap();
    assert_eq!(again.updated, 0);
}

#[tokio::test]
async fn test_fix_access_replaces_policies() {
    let node = FakeNode::default();
    let access = settings().access;
    node.insert(SystemMetadata::new("urn:uuid:open", "text/csv", 1, md5_hex(b"1")));
    node.insert(
        SystemMetadata::new("urn:uuid:done", "text/csv", 1, md5_hex(b"2"))
            .with_access(AccessPolicy::from_settings(&access)),
    );

    let summary = fix_access(&node, 3, &access).await.unwrap();
    assert_eq!(summary.listed, 2);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.unchanged, 1);
    assert!(summary.failed.is_empty());
    assert_eq!(node.updated(), vec!["urn:uuid:open".to_string()]);
    assert_eq!(
        node.sysmeta("urn:uuid:open").access_policy,
        Some(AccessPolicy::from_settings(&access))
    );
}
