//! EML document construction
//!
//! [`DocumentBuilder::build`] runs the crosswalk rules, then adds the parts
//! that need more than a field copy: parsed creator names, coverage pulled
//! from free text, the contact and publisher blocks, and one entity per
//! uploaded file. Children of `dataset` are finally put in schema order.

use super::crosswalk::{CompiledRule, Crosswalk, FieldKind};
use super::tree::{Document, NodeId, PathSegment};
use crate::coords::get_lat_lon;
use crate::error::{ImportError, Result};
use crate::names::{self, ParsedName};
use emlx_common::formats::format_id_for;
use emlx_common::types::SourceRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const EML_NAMESPACE: &str = "https://eml.ecoinformatics.org/eml-2.2.0";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const SCHEMA_LOCATION: &str =
    "https://eml.ecoinformatics.org/eml-2.2.0 https://eml.ecoinformatics.org/eml-2.2.0/eml.xsd";
pub const ORCID_DIRECTORY: &str = "https://orcid.org";

pub const COVERAGE_DESCRIPTION: &str = "Bounding coordinate derived from article description";

pub const PROVENANCE_NOTE: &str = "This metadata record was imported using an automated process. \
The original metadata used for creating this record is preserved as a JSON file in this data \
package. Errors should be reported to the repository administrator.";

/// Schema order of `dataset` children
const DATASET_ORDER: &[&str] = &[
    "alternateIdentifier",
    "shortName",
    "title",
    "creator",
    "metadataProvider",
    "associatedParty",
    "pubDate",
    "language",
    "series",
    "abstract",
    "keywordSet",
    "additionalInfo",
    "intellectualRights",
    "licensed",
    "distribution",
    "coverage",
    "annotation",
    "purpose",
    "introduction",
    "gettingStarted",
    "acknowledgements",
    "maintenance",
    "contact",
    "publisher",
    "pubPlace",
    "methods",
    "project",
    "dataTable",
    "spatialRaster",
    "spatialVector",
    "storedProcedure",
    "view",
    "otherEntity",
];

/// Fixed organizational contact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Publisher names keyed by repository group id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    pub default_name: String,
    pub groups: BTreeMap<String, String>,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        let groups = [
            ("46785", "Smithsonian Center for Folklife and Cultural Heritage"),
            ("23468", "Smithsonian Museum Conservation Institute"),
            ("23471", "Smithsonian National Air and Space Museum"),
            ("35808", "Smithsonian National Museum of Asian Art"),
            ("23477", "Smithsonian National Museum of Natural History"),
            ("23492", "Smithsonian National Museum of American History"),
            ("28985", "Smithsonian National Museum of the American Indian"),
            ("23474", "Smithsonian National Zoo and Conservation Biology Institute"),
            ("23480", "Smithsonian Office of the Chief Information Officer"),
            ("48638", "Smithsonian Office of International Relations"),
            ("23483", "Smithsonian Environmental Research Center"),
            ("23489", "Smithsonian Libraries and Archives"),
            ("23486", "Smithsonian Tropical Research Institute"),
            ("23417", "Smithsonian Research Data"),
        ];
        Self {
            default_name: "Smithsonian Research Data".to_string(),
            groups: groups
                .into_iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
        }
    }
}

impl PublisherSettings {
    pub fn name_for(&self, group_id: Option<u64>) -> &str {
        group_id
            .and_then(|id| self.groups.get(&id.to_string()))
            .map(String::as_str)
            .unwrap_or(&self.default_name)
    }
}

/// Static parts of every generated document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmlSettings {
    /// `system` attribute of the root element
    pub system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactSettings>,
    pub publisher: PublisherSettings,
}

impl Default for EmlSettings {
    fn default() -> Self {
        Self {
            system: "https://si.edu".to_string(),
            contact: None,
            publisher: PublisherSettings::default(),
        }
    }
}

/// Builds EML documents from source records
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    rules: Vec<CompiledRule>,
    settings: EmlSettings,
}

impl DocumentBuilder {
    pub fn new(crosswalk: &Crosswalk, settings: EmlSettings) -> Result<Self> {
        Ok(Self {
            rules: crosswalk.compile()?,
            settings,
        })
    }

    /// Build a document without checking required elements
    pub fn build(&self, record: &SourceRecord, package_id: &str) -> Document {
        let mut doc = Document::new(
            "eml:eml",
            &[
                ("xmlns:eml", EML_NAMESPACE),
                ("xmlns:xsi", XSI_NAMESPACE),
                ("xsi:schemaLocation", SCHEMA_LOCATION),
                ("packageId", package_id),
                ("system", &self.settings.system),
            ],
        );
        let root = doc.root();
        let dataset = doc.ensure_child(root, "dataset", &[]);

        for compiled in &self.rules {
            let values = compiled.rule.values(record);
            if values.is_empty() {
                continue;
            }
            for target in &compiled.targets {
                write_values(&mut doc, dataset, target, compiled.rule.kind, &values);
            }
        }

        let authors: Vec<(ParsedName, Option<String>)> = record
            .authors()
            .into_iter()
            .map(|person| (names::parse(&person.full_name), person.orcid_id))
            .filter(|(parsed, _)| !matches!(parsed, ParsedName::Unparsed))
            .collect();
        for (parsed, orcid) in &authors {
            let creator = doc.append_child(dataset, "creator", &[]);
            add_person(&mut doc, creator, parsed, orcid.as_deref());
        }

        self.add_coverage(&mut doc, dataset, record);

        let info = doc.ensure_child(dataset, "additionalInfo", &[]);
        let para = doc.append_child(info, "para", &[]);
        doc.set_text(para, PROVENANCE_NOTE);

        self.add_contact(&mut doc, dataset, authors.first());

        let publisher = doc.ensure_child(dataset, "publisher", &[]);
        let org = doc.ensure_child(publisher, "organizationName", &[]);
        doc.set_text(org, self.settings.publisher.name_for(record.group_id()));

        add_entities(&mut doc, dataset, record);

        doc.sort_children(dataset, DATASET_ORDER);
        debug!(package_id, nodes = doc.len(), "Built metadata document");
        doc
    }

    /// Build and check required elements
    pub fn build_validated(&self, record: &SourceRecord, package_id: &str) -> Result<Document> {
        let doc = self.build(record, package_id);
        validate_required(&doc).map_err(|reason| ImportError::validation(package_id, reason))?;
        Ok(doc)
    }

    fn add_coverage(&self, doc: &mut Document, dataset: NodeId, record: &SourceRecord) {
        let Some(description) = record.description() else {
            return;
        };
        let Some(pairs) = get_lat_lon(&description) else {
            return;
        };
        for pair in pairs {
            if !pair.is_valid() {
                warn!(
                    latitude = pair.latitude,
                    longitude = pair.longitude,
                    "Skipping out-of-range coordinate pair"
                );
                continue;
            }
            let coverage = doc.ensure_child(dataset, "coverage", &[]);
            let geo = doc.append_child(coverage, "geographicCoverage", &[]);
            let description = doc.ensure_child(geo, "geographicDescription", &[]);
            doc.set_text(description, COVERAGE_DESCRIPTION);
            let bounds = doc.ensure_child(geo, "boundingCoordinates", &[]);
            let lat = pair.latitude.to_string();
            let lon = pair.longitude.to_string();
            for (tag, value) in [
                ("westBoundingCoordinate", &lon),
                ("eastBoundingCoordinate", &lon),
                ("northBoundingCoordinate", &lat),
                ("southBoundingCoordinate", &lat),
            ] {
                let node = doc.ensure_child(bounds, tag, &[]);
                doc.set_text(node, value);
            }
        }
    }

    fn add_contact(&self, doc: &mut Document, dataset: NodeId, first_author: Option<&(ParsedName, Option<String>)>) {
        if let Some(contact) = &self.settings.contact {
            let node = doc.ensure_child(dataset, "contact", &[]);
            for (tag, value) in [
                ("organizationName", &contact.organization_name),
                ("positionName", &contact.position_name),
                ("electronicMailAddress", &contact.email),
                ("onlineUrl", &contact.url),
            ] {
                if let Some(value) = value {
                    let child = doc.ensure_child(node, tag, &[]);
                    doc.set_text(child, value);
                }
            }
        } else if let Some((parsed, orcid)) = first_author {
            let node = doc.ensure_child(dataset, "contact", &[]);
            add_person(doc, node, parsed, orcid.as_deref());
        }
    }
}

fn write_values(doc: &mut Document, dataset: NodeId, target: &[PathSegment], kind: FieldKind, values: &[String]) {
    match kind {
        FieldKind::Text => {
            let node = doc.ensure_path(dataset, target);
            if let Some(value) = values.last() {
                doc.set_text(node, value);
            }
        },
        FieldKind::Paragraphs => {
            let container = doc.ensure_path(dataset, target);
            for value in values {
                let para = doc.append_child(container, "para", &[]);
                doc.set_text(para, value);
            }
        },
        FieldKind::List => {
            let Some((leaf, parents)) = target.split_last() else {
                return;
            };
            let parent = doc.ensure_path(dataset, parents);
            let attrs = leaf.attribute_refs();
            for value in values {
                let item = doc.append_child(parent, &leaf.tag, &attrs);
                doc.set_text(item, value);
            }
        },
    }
}

fn add_person(doc: &mut Document, parent: NodeId, name: &ParsedName, orcid: Option<&str>) {
    let individual = doc.ensure_child(parent, "individualName", &[]);
    if let Some(given) = name.given() {
        let node = doc.ensure_child(individual, "givenName", &[]);
        doc.set_text(node, given);
    }
    if let Some(family) = name.family() {
        let node = doc.ensure_child(individual, "surName", &[]);
        doc.set_text(node, family);
    }
    if let Some(orcid) = orcid {
        let node = doc.ensure_child(parent, "userId", &[("directory", ORCID_DIRECTORY)]);
        doc.set_text(node, orcid);
    }
}

fn add_entities(doc: &mut Document, dataset: NodeId, record: &SourceRecord) {
    for file in record.files() {
        let Some(pid) = file.remote_identifier.as_deref() else {
            warn!(file = %file.name, "File has no remote identifier, leaving it out of the document");
            continue;
        };
        let entity = doc.append_child(dataset, "otherEntity", &[("id", pid)]);
        let name = doc.ensure_child(entity, "entityName", &[]);
        doc.set_text(name, &file.name);
        let entity_type = doc.ensure_child(entity, "entityType", &[]);
        let mimetype = file
            .mimetype
            .clone()
            .unwrap_or_else(|| format_id_for(&file.name).to_string());
        doc.set_text(entity_type, &mimetype);
    }
}

/// Check that a document carries a title and at least one creator
pub fn validate_required(doc: &Document) -> std::result::Result<(), String> {
    let Some(dataset) = doc.children_named(doc.root(), "dataset").next() else {
        return Err("missing dataset element".to_string());
    };
    if doc.child_text(dataset, "title").is_none_or(|t| t.trim().is_empty()) {
        return Err("missing title".to_string());
    }
    if doc.children_named(dataset, "creator").next().is_none() {
        return Err("no parseable creator".to_string());
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::eml::writer::to_xml_string;
    use serde_json::json;

    fn builder() -> DocumentBuilder {
        DocumentBuilder::new(&Crosswalk::figshare(), EmlSettings::default()).unwrap()
    }

    fn record(value: serde_json::Value) -> SourceRecord {
        serde_json::from_value(value).unwrap()
    }

    fn dataset(doc: &Document) -> NodeId {
        doc.children_named(doc.root(), "dataset").next().unwrap()
    }

    fn child_tags(doc: &Document, id: NodeId) -> Vec<String> {
        doc.node(id).children.iter().map(|&c| doc.node(c).tag.clone()).collect()
    }

    #[test]
    fn test_minimal_record() {
        let rec = record(json!({
            "doi": "10.25573/data.1",
            "title": "T",
            "authors": [{"full_name": "Smith, John"}],
            "files": []
        }));
        let doc = builder().build_validated(&rec, "doi:10.25573/data.1").unwrap();
        let ds = dataset(&doc);

        assert_eq!(doc.child_text(ds, "title"), Some("T"));
        let creator = doc.children_named(ds, "creator").next().unwrap();
        let individual = doc.children_named(creator, "individualName").next().unwrap();
        assert_eq!(doc.child_text(individual, "givenName"), Some("John"));
        assert_eq!(doc.child_text(individual, "surName"), Some("Smith"));
        assert!(doc.children_named(ds, "otherEntity").next().is_none());

        let root = doc.node(doc.root());
        assert!(root
            .attributes
            .contains(&("packageId".to_string(), "doi:10.25573/data.1".to_string())));
    }

    #[test]
    fn test_missing_title_fails_validation() {
        let rec = record(json!({"doi": "10.1/x", "authors": [{"full_name": "Smith, John"}]}));
        let err = builder().build_validated(&rec, "doi:10.1/x").unwrap_err();
        assert!(matches!(err, ImportError::Validation { .. }));
    }

    #[test]
    fn test_unparseable_authors_fail_validation() {
        let rec = record(json!({"title": "T", "authors": [{"full_name": "  "}]}));
        assert!(builder().build_validated(&rec, "x").is_err());
    }

    #[test]
    fn test_full_record() {
        let rec = record(json!({
            "doi": "10.25573/data.2.v1",
            "url_public_html": "https://figshare.com/articles/2",
            "title": "Bird counts",
            "published_date": "2021-03-04T10:20:30Z",
            "description": "<p>Counts at 9.1°N, 79.8°W.</p><p>Bad site 140.0°, 20.0°</p>",
            "tags": ["birds", "panama"],
            "license": {"name": "CC0", "url": "https://cc.org/zero"},
            "group_id": 23486,
            "authors": [
                {"full_name": "Michiel van Breugel", "orcid_id": "0000-0001-2345-6789"},
                {"full_name": "Cher"}
            ],
            "files": [
                {"name": "counts.csv", "size": 3, "remote_identifier": "urn:uuid:1"},
                {"name": "notes.txt", "size": 3}
            ]
        }));
        let doc = builder().build_validated(&rec, "doi:10.25573/data.2.v1").unwrap();
        let ds = dataset(&doc);

        assert_eq!(
            child_tags(&doc, ds),
            vec![
                "alternateIdentifier",
                "alternateIdentifier",
                "title",
                "creator",
                "creator",
                "pubDate",
                "abstract",
                "keywordSet",
                "additionalInfo",
                "intellectualRights",
                "distribution",
                "coverage",
                "contact",
                "publisher",
                "otherEntity",
            ]
        );
        assert_eq!(doc.child_text(ds, "pubDate"), Some("2021-03-04"));

        let coverage = doc.children_named(ds, "coverage").next().unwrap();
        assert_eq!(doc.children_named(coverage, "geographicCoverage").count(), 1);

        let keywords = doc.children_named(ds, "keywordSet").next().unwrap();
        assert_eq!(doc.children_named(keywords, "keyword").count(), 2);

        let publisher = doc.children_named(ds, "publisher").next().unwrap();
        assert_eq!(
            doc.child_text(publisher, "organizationName"),
            Some("Smithsonian Tropical Research Institute")
        );

        let xml = to_xml_string(&doc).unwrap();
        assert!(xml.contains("<surName>van Breugel</surName>"));
        assert!(xml.contains(r#"<userId directory="https://orcid.org">0000-0001-2345-6789</userId>"#));
        assert!(xml.contains(r#"<otherEntity id="urn:uuid:1">"#));
        assert!(!xml.contains("notes.txt"));
        assert!(xml.contains("<westBoundingCoordinate>-79.8</westBoundingCoordinate>"));
        assert!(xml.contains("<para>CC0 (https://cc.org/zero)</para>"));
        assert!(xml.contains(r#"<url function="information">https://figshare.com/articles/2</url>"#));
    }

    #[test]
    fn test_configured_contact_replaces_first_author() {
        let settings = EmlSettings {
            contact: Some(ContactSettings {
                organization_name: Some("Data Office".to_string()),
                email: Some("data@example.org".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let builder = DocumentBuilder::new(&Crosswalk::figshare(), settings).unwrap();
        let rec = record(json!({"title": "T", "authors": [{"full_name": "Smith, John"}]}));
        let doc = builder.build(&rec, "p");
        let contact = doc.children_named(dataset(&doc), "contact").next().unwrap();
        assert_eq!(child_tags(&doc, contact), vec!["organizationName", "electronicMailAddress"]);
    }

    #[test]
    fn test_unknown_group_uses_default_publisher() {
        let settings = PublisherSettings::default();
        assert_eq!(settings.name_for(Some(1)), "Smithsonian Research Data");
        assert_eq!(settings.name_for(None), "Smithsonian Research Data");
        assert_eq!(settings.name_for(Some(23471)), "Smithsonian National Air and Space Museum");
    }

    #[test]
    fn test_build_is_deterministic() {
        let rec = record(json!({"title": "T", "tags": ["a"], "authors": [{"full_name": "A B"}]}));
        let first = to_xml_string(&builder().build(&rec, "p")).unwrap();
        let second = to_xml_string(&builder().build(&rec, "p")).unwrap();
        assert_eq!(first, second);
    }
}
