//! DataONE wire types
//!
//! Responses are read with `quick_xml::de`. System metadata is written back
//! through the element tree so element order follows the schema.

use crate::eml::{to_xml_string, Document};
use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SYSMETA_V2_NAMESPACE: &str = "http://ns.dataone.org/service/types/v2.0";
pub const TYPES_V1_NAMESPACE: &str = "http://ns.dataone.org/service/types/v1";
pub const PUBLIC_SUBJECT: &str = "public";

// ============================================================================
// Errors
// ============================================================================

/// Whether retrying a failed call can help
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Network failure, timeout, 5xx
    Transient,
    /// Rejected request (4xx) or unreadable response
    Permanent,
}

/// A failed member node call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Member node {operation} failed: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub operation: String,
    pub status: Option<u16>,
    /// DataONE exception name, e.g. `InvalidSystemMetadata`
    pub name: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@detailCode", default)]
    detail_code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl ServiceError {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Transient,
            operation: operation.into(),
            status: None,
            name: None,
            message: message.into(),
        }
    }

    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Permanent,
            operation: operation.into(),
            status: None,
            name: None,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP response, reading a DataONE error body if present
    pub fn from_response(operation: impl Into<String>, status: u16, body: &str) -> Self {
        let kind = if status >= 500 || status == 408 || status == 429 {
            ServiceErrorKind::Transient
        } else {
            ServiceErrorKind::Permanent
        };
        let parsed = Some(body.trim())
            .filter(|b| b.starts_with('<'))
            .and_then(|b| quick_xml::de::from_str::<ErrorBody>(b).ok())
            .filter(|b| b.name.is_some() || b.description.is_some());
        let name = parsed.as_ref().and_then(|b| b.name.clone());
        let message = match parsed {
            Some(ErrorBody {
                name,
                detail_code,
                description,
            }) => format!(
                "HTTP {status} {}{}: {}",
                name.unwrap_or_default(),
                detail_code.map(|c| format!(" ({c})")).unwrap_or_default(),
                description.map(|d| d.trim().to_string()).unwrap_or_default()
            ),
            None => {
                let snippet: String = body.trim().chars().take(200).collect();
                format!("HTTP {status}: {snippet}")
            },
        };
        Self {
            kind,
            operation: operation.into(),
            status: Some(status),
            name,
            message,
        }
    }

    /// Classify a transport-level failure
    pub fn from_transport(operation: impl Into<String>, error: &reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
            Self::transient(operation, error.to_string())
        } else {
            Self::permanent(operation, error.to_string())
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ServiceErrorKind::Transient
    }
}

// ============================================================================
// Access control
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Permission {
    Read,
    Write,
    ChangePermission,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::ChangePermission => "changePermission",
        }
    }
}

impl TryFrom<String> for Permission {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.trim() {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "changePermission" => Ok(Permission::ChangePermission),
            other => Err(format!("unknown permission '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessRule {
    #[serde(rename = "subject", default)]
    pub subjects: Vec<String>,
    #[serde(rename = "permission", default)]
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccessPolicy {
    #[serde(rename = "allow", default)]
    pub rules: Vec<AccessRule>,
}

/// Groups granted access to every uploaded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSettings {
    pub public_read: bool,
    pub read_groups: Vec<String>,
    pub write_groups: Vec<String>,
    pub change_permission_groups: Vec<String>,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            public_read: true,
            read_groups: Vec::new(),
            write_groups: Vec::new(),
            change_permission_groups: Vec::new(),
        }
    }
}

impl AccessPolicy {
    pub fn from_settings(settings: &AccessSettings) -> Self {
        let mut rules = Vec::new();
        if settings.public_read {
            rules.push(AccessRule {
                subjects: vec![PUBLIC_SUBJECT.to_string()],
                permissions: vec![Permission::Read],
            });
        }
        for (groups, permission) in [
            (&settings.read_groups, Permission::Read),
            (&settings.write_groups, Permission::Write),
            (&settings.change_permission_groups, Permission::ChangePermission),
        ] {
            if !groups.is_empty() {
                rules.push(AccessRule {
                    subjects: groups.clone(),
                    permissions: vec![permission],
                });
            }
        }
        Self { rules }
    }
}

// ============================================================================
// System metadata
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Checksum {
    #[serde(rename = "@algorithm")]
    pub algorithm: String,
    #[serde(rename = "$text")]
    pub value: String,
}

impl Checksum {
    pub fn md5(value: impl Into<String>) -> Self {
        Self {
            algorithm: "MD5".to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplicationPolicy {
    #[serde(rename = "@replicationAllowed", default)]
    pub replication_allowed: Option<bool>,
    #[serde(rename = "@numberReplicas", default)]
    pub number_replicas: Option<u32>,
}

/// A copy of an object held by another member node
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replica {
    #[serde(default)]
    pub replica_member_node: Option<String>,
    #[serde(default)]
    pub replication_status: Option<String>,
    #[serde(default)]
    pub replica_verified: Option<String>,
}

/// System metadata of one object
///
/// `mediaType` and the preferred/blocked node lists of `replicationPolicy`
/// are not modelled and are dropped when the document is written back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetadata {
    #[serde(default)]
    pub serial_version: Option<u64>,
    pub identifier: String,
    pub format_id: String,
    pub size: u64,
    pub checksum: Checksum,
    #[serde(default)]
    pub submitter: Option<String>,
    pub rights_holder: String,
    #[serde(default)]
    pub access_policy: Option<AccessPolicy>,
    #[serde(default)]
    pub replication_policy: Option<ReplicationPolicy>,
    #[serde(default)]
    pub obsoletes: Option<String>,
    #[serde(default)]
    pub obsoleted_by: Option<String>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub date_uploaded: Option<String>,
    #[serde(default)]
    pub date_sys_metadata_modified: Option<String>,
    #[serde(default)]
    pub origin_member_node: Option<String>,
    #[serde(default)]
    pub authoritative_member_node: Option<String>,
    #[serde(default)]
    pub replica: Vec<Replica>,
    #[serde(default)]
    pub series_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl SystemMetadata {
    /// Metadata for a new object, stamped with the current time
    pub fn new(identifier: impl Into<String>, format_id: impl Into<String>, size: u64, md5: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            serial_version: Some(1),
            identifier: identifier.into(),
            format_id: format_id.into(),
            size,
            checksum: Checksum::md5(md5),
            submitter: None,
            rights_holder: String::new(),
            access_policy: None,
            replication_policy: None,
            obsoletes: None,
            obsoleted_by: None,
            archived: None,
            date_uploaded: Some(now.clone()),
            date_sys_metadata_modified: Some(now),
            origin_member_node: None,
            authoritative_member_node: None,
            replica: Vec::new(),
            series_id: None,
            file_name: None,
        }
    }

    /// Submitter and rights holder
    pub fn owned_by(mut self, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        self.submitter = Some(subject.clone());
        self.rights_holder = subject;
        self
    }

    /// Origin and authoritative node
    pub fn on_node(mut self, node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        self.origin_member_node = Some(node_id.clone());
        self.authoritative_member_node = Some(node_id);
        self
    }

    pub fn with_access(mut self, policy: AccessPolicy) -> Self {
        self.access_policy = Some(policy);
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    /// Serialize as a `systemMetadata` document
    pub fn to_xml(&self) -> Result<String> {
        let mut doc = Document::new(
            "d1_v2.0:systemMetadata",
            &[("xmlns:d1_v2.0", SYSMETA_V2_NAMESPACE), ("xmlns:d1", TYPES_V1_NAMESPACE)],
        );
        let root = doc.root();
        let text = |doc: &mut Document, tag: &str, value: Option<&str>| push_text(doc, root, tag, value);

        let serial = self.serial_version.map(|v| v.to_string());
        let size = self.size.to_string();
        text(&mut doc, "serialVersion", serial.as_deref());
        text(&mut doc, "identifier", Some(&self.identifier));
        text(&mut doc, "formatId", Some(&self.format_id));
        text(&mut doc, "size", Some(&size));
        let checksum = doc.append_child(root, "checksum", &[("algorithm", &self.checksum.algorithm)]);
        doc.set_text(checksum, &self.checksum.value);
        text(&mut doc, "submitter", self.submitter.as_deref());
        text(&mut doc, "rightsHolder", Some(&self.rights_holder));

        if let Some(policy) = &self.access_policy {
            let access = doc.append_child(root, "accessPolicy", &[]);
            for rule in &policy.rules {
                let allow = doc.append_child(access, "allow", &[]);
                for subject in &rule.subjects {
                    let node = doc.append_child(allow, "subject", &[]);
                    doc.set_text(node, subject);
                }
                for permission in &rule.permissions {
                    let node = doc.append_child(allow, "permission", &[]);
                    doc.set_text(node, permission.as_str());
                }
            }
        }

        if let Some(replication) = &self.replication_policy {
            let allowed = replication.replication_allowed.map(|b| b.to_string());
            let replicas = replication.number_replicas.map(|n| n.to_string());
            let mut attrs = Vec::new();
            if let Some(allowed) = &allowed {
                attrs.push(("replicationAllowed", allowed.as_str()));
            }
            if let Some(replicas) = &replicas {
                attrs.push(("numberReplicas", replicas.as_str()));
            }
            doc.append_child(root, "replicationPolicy", &attrs);
        }

        let archived = self.archived.map(|b| b.to_string());
        text(&mut doc, "obsoletes", self.obsoletes.as_deref());
        text(&mut doc, "obsoletedBy", self.obsoleted_by.as_deref());
        text(&mut doc, "archived", archived.as_deref());
        text(&mut doc, "dateUploaded", self.date_uploaded.as_deref());
        text(&mut doc, "dateSysMetadataModified", self.date_sys_metadata_modified.as_deref());
        text(&mut doc, "originMemberNode", self.origin_member_node.as_deref());
        text(&mut doc, "authoritativeMemberNode", self.authoritative_member_node.as_deref());
        for replica in &self.replica {
            let node = doc.append_child(root, "replica", &[]);
            push_text(&mut doc, node, "replicaMemberNode", replica.replica_member_node.as_deref());
            push_text(&mut doc, node, "replicationStatus", replica.replication_status.as_deref());
            push_text(&mut doc, node, "replicaVerified", replica.replica_verified.as_deref());
        }
        text(&mut doc, "seriesId", self.series_id.as_deref());
        text(&mut doc, "fileName", self.file_name.as_deref());

        to_xml_string(&doc)
    }
}

fn push_text(doc: &mut Document, parent: usize, tag: &str, value: Option<&str>) {
    if let Some(value) = value {
        let node = doc.append_child(parent, tag, &[]);
        doc.set_text(node, value);
    }
}

// ============================================================================
// Object listing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub identifier: String,
    pub format_id: String,
    pub checksum: Checksum,
    #[serde(default)]
    pub date_sys_metadata_modified: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// One page of `listObjects`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ObjectList {
    #[serde(rename = "@count", default)]
    pub count: u32,
    #[serde(rename = "@start", default)]
    pub start: u32,
    #[serde(rename = "@total", default)]
    pub total: u32,
    #[serde(rename = "objectInfo", default)]
    pub objects: Vec<ObjectInfo>,
}
