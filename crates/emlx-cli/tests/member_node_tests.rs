//! HTTP member node client tests against a mock DataONE API

use emlx_cli::member_node::{
    HttpMemberNode, MemberNode, RetryPolicy, Retrying, ServiceErrorKind, SystemMetadata,
};
use std::time::Duration;
use wiremock::{
    matchers::{body_string_contains, header, method, path, path_regex, query_param},
    Mock, MockServer, ResponseTemplate,
};

const SYSMETA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d1_v2.0:systemMetadata xmlns:d1_v2.0="http://ns.dataone.org/service/types/v2.0" xmlns:d1="http://ns.dataone.org/service/types/v1">
  <serialVersion>3</serialVersion>
  <identifier>urn:uuid:old</identifier>
  <formatId>text/csv</formatId>
  <size>21</size>
  <checksum algorithm="MD5">4d6b3f1d0c7b5a2e9f8e7d6c5b4a3928</checksum>
  <submitter>http://orcid.org/0000-0002-1825-0097</submitter>
  <rightsHolder>http://orcid.org/0000-0002-1825-0097</rightsHolder>
  <accessPolicy>
    <allow><subject>public</subject><permission>read</permission></allow>
  </accessPolicy>
  <obsoletedBy>urn:uuid:new</obsoletedBy>
  <dateUploaded>2024-05-01T10:00:00.000+00:00</dateUploaded>
  <dateSysMetadataModified>2024-05-02T10:00:00.000+00:00</dateSysMetadataModified>
  <fileName>counts.csv</fileName>
</d1_v2.0:systemMetadata>"#;

fn client(server: &MockServer) -> HttpMemberNode {
    HttpMemberNode::new(server.uri(), Some("tok".to_string()), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_create_posts_multipart_and_reads_identifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/object"))
        .and(header("authorization", "Bearer tok"))
        .and(body_string_contains("urn:uuid:new"))
        .and(body_string_contains("sysmeta.xml"))
        .and(body_string_contains("<formatId>text/csv</formatId>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<d1:identifier xmlns:d1="http://ns.dataone.org/service/types/v1">urn:uuid:new</d1:identifier>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let sysmeta = SystemMetadata::new("urn:uuid:new", "text/csv", 4, "0123456789abcdef0123456789abcdef")
        .with_file_name("counts.csv");
    let pid = client(&server).create("urn:uuid:new", b"a,b\n", &sysmeta).await.unwrap();
    assert_eq!(pid, "urn:uuid:new");
}

#[tokio::test]
async fn test_get_system_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/v2/meta/urn"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SYSMETA))
        .mount(&server)
        .await;

    let meta = client(&server).get_system_metadata("urn:uuid:old").await.unwrap();
    assert_eq!(meta.identifier, "urn:uuid:old");
    assert_eq!(meta.serial_version, Some(3));
    assert_eq!(meta.size, 21);
    assert_eq!(meta.checksum.algorithm, "MD5");
    assert_eq!(meta.obsoleted_by.as_deref(), Some("urn:uuid:new"));
    assert_eq!(meta.file_name.as_deref(), Some("counts.csv"));
    assert_eq!(meta.access_policy.unwrap().rules[0].subjects, vec!["public"]);
}

#[tokio::test]
async fn test_update_system_metadata_puts_document() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/meta"))
        .and(body_string_contains("<obsoletes>urn:uuid:old</obsoletes>"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<d1:boolean>true</d1:boolean>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut meta = SystemMetadata::new("urn:uuid:new", "text/csv", 4, "0123456789abcdef0123456789abcdef");
    meta.obsoletes = Some("urn:uuid:old".to_string());
    client(&server).update_system_metadata("urn:uuid:new", &meta).await.unwrap();
}

#[tokio::test]
async fn test_list_objects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/object"))
        .and(query_param("start", "0"))
        .and(query_param("count", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<ns2:objectList xmlns:ns2="http://ns.dataone.org/service/types/v1" count="2" start="0" total="2">
  <objectInfo>
    <identifier>urn:uuid:a</identifier>
    <formatId>text/csv</formatId>
    <checksum algorithm="MD5">aaaa</checksum>
    <dateSysMetadataModified>2024-05-02T10:00:00.000+00:00</dateSysMetadataModified>
    <size>10</size>
  </objectInfo>
  <objectInfo>
    <identifier>urn:uuid:b</identifier>
    <formatId>https://eml.ecoinformatics.org/eml-2.2.0</formatId>
    <checksum algorithm="MD5">bbbb</checksum>
    <size>2000</size>
  </objectInfo>
</ns2:objectList>"#,
        ))
        .mount(&server)
        .await;

    let list = client(&server).list_objects(0, 1000, None).await.unwrap();
    assert_eq!(list.total, 2);
    assert_eq!(list.objects.len(), 2);
    assert_eq!(list.objects[0].checksum.value, "aaaa");
    assert_eq!(list.objects[1].size, 2000);
}

#[tokio::test]
async fn test_dataone_error_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/v2/meta/"))
        .respond_with(ResponseTemplate::new(404).set_body_string(
            r#"<error detailCode="1060" errorCode="404" name="NotFound"><description>No system metadata could be found for given PID: urn:uuid:gone</description></error>"#,
        ))
        .mount(&server)
        .await;

    let err = client(&server).get_system_metadata("urn:uuid:gone").await.unwrap_err();
    assert_eq!(err.kind, ServiceErrorKind::Permanent);
    assert_eq!(err.status, Some(404));
    assert_eq!(err.name.as_deref(), Some("NotFound"));
    assert!(err.message.contains("No system metadata"));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/v2/meta/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/v2/meta/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SYSMETA))
        .expect(1)
        .mount(&server)
        .await;

    let node = Retrying::new(client(&server), RetryPolicy::new(3, 1));
    let meta = node.get_system_metadata("urn:uuid:old").await.unwrap();
    assert_eq!(meta.identifier, "urn:uuid:old");
}

#[tokio::test]
async fn test_single_attempt_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/object"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let node = Retrying::new(client(&server), RetryPolicy::default());
    let sysmeta = SystemMetadata::new("urn:uuid:x", "text/plain", 1, "0123456789abcdef0123456789abcdef");
    let err = node.create("urn:uuid:x", b"x", &sysmeta).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unreachable_node_is_transient() {
    let node = HttpMemberNode::new("http://127.0.0.1:1", None, Duration::from_secs(2)).unwrap();
    let err = node.list_objects(0, 10, None).await.unwrap_err();
    assert!(err.is_transient());
}
