//! End-to-end tests for the emlx binary
//!
//! These tests validate:
//! - Offline conversion of a record list
//! - Configuration loading and display
//! - Exit codes for failed and misconfigured runs

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

fn write_records(dir: &Path) {
    let records = json!([
        {
            "id": 1000,
            "doi": "10.25573/data.1000.v1",
            "title": "Bird counts: Chesapeake Bay",
            "description": "Monthly counts<br>Collected at 38.88 N, 76.54 W",
            "published_date": "2021-03-04T12:00:00Z",
            "authors": [{"full_name": "Jane Q. Smith", "orcid_id": ""}],
            "tags": ["birds", "estuary"],
            "license": {"name": "CC0", "url": "https://creativecommons.org/publicdomain/zero/1.0/"},
            "group_id": 23483,
            "files": [{"name": "counts.csv", "size": 21, "computed_md5": "0123456789abcdef0123456789abcdef"}]
        },
        {
            "id": 2000,
            "title": "No authors",
            "authors": []
        }
    ]);
    std::fs::write(dir.join("records.json"), serde_json::to_string_pretty(&records).unwrap()).unwrap();
}

fn write_config(dir: &Path, extra: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    let content = format!(
        r#"
metadata_json = "{root}/records.json"
data_root = "{root}/data"
work_dir = "{root}/work"
{extra}
"#,
        root = dir.display()
    );
    std::fs::write(&path, content).unwrap();
    path
}

fn emlx(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("emlx").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("EMLX_NODE_ID")
        .env_remove("EMLX_MN_URL")
        .env_remove("EMLX_DATA_ROOT")
        .env_remove("EMLX_METADATA_JSON")
        .env("EMLX_LOG_LEVEL", "error");
    cmd
}

#[test]
fn test_convert_writes_documents() {
    let dir = tempfile::tempdir().unwrap();
    write_records(dir.path());
    let config = write_config(dir.path(), "");

    emlx(&dir)
        .arg("--config")
        .arg(&config)
        .arg("convert")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Converting 2 record(s)"))
        .stdout(predicate::str::contains("Bird_counts_Chesapeake_Bay.xml"))
        .stdout(predicate::str::contains("no parseable creator"));

    let xml = std::fs::read_to_string(
        dir.path()
            .join("data/10.25573/data.1000.v1/Bird_counts_Chesapeake_Bay.xml"),
    )
    .unwrap();
    assert!(xml.contains("packageId=\"doi:10.25573/data.1000.v1\""));
    assert!(xml.contains("<surName>Smith</surName>"));
    assert!(xml.contains("<pubDate>2021-03-04</pubDate>"));
    assert!(xml.contains("<keyword>estuary</keyword>"));
    assert!(xml.contains("<para>Collected at 38.88 N, 76.54 W</para>"));
    assert!(dir
        .path()
        .join("data/10.25573/data.1000.v1/Bird_counts_Chesapeake_Bay.json")
        .exists());
}

#[test]
fn test_upload_requires_node_settings() {
    let dir = tempfile::tempdir().unwrap();
    write_records(dir.path());
    let config = write_config(dir.path(), "");

    emlx(&dir)
        .arg("--config")
        .arg(&config)
        .arg("upload")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"))
        .stderr(predicate::str::contains("node_id"));
}

#[tokio::test]
async fn test_upload_reports_failed_packages() {
    let server = wiremock::MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    write_records(dir.path());
    let config = write_config(
        dir.path(),
        &format!(
            r#"rightsholder_orcid = "http://orcid.org/0000-0002-1825-0097"
node_id = "urn:node:TEST"
mn_url = "{}""#,
            server.uri()
        ),
    );

    // neither record can be packaged: no files on disk, no creator
    emlx(&dir)
        .arg("--config")
        .arg(&config)
        .arg("upload")
        .env("EMLX_TOKEN", "tok")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Package creation report:"))
        .stdout(predicate::str::contains("Failed packages:     2"))
        .stdout(predicate::str::contains("No local files found"));

    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    assert!(dir.path().join("work/urn_node_TEST.json").exists());
}

#[test]
fn test_config_show() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), r#"node_id = "urn:node:SHOW""#);

    emlx(&dir)
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("urn:node:SHOW"))
        .stdout(predicate::str::contains("https://cn.dataone.org/cn"));
}

#[test]
fn test_unreadable_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    emlx(&dir)
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("convert")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn test_subcommand_required() {
    let dir = tempfile::tempdir().unwrap();
    emlx(&dir)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("A subcommand is required"));
}
