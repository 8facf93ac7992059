//! OAI-ORE resource maps
//!
//! A resource map ties one metadata document to the data objects it
//! documents. Resources are named by their coordinating-node resolve URLs.

use crate::eml::{to_xml_string, Document, NodeId};
use crate::error::Result;
use crate::member_node::endpoints::resolve_url;
use chrono::{DateTime, SecondsFormat, Utc};

const NAMESPACES: &[(&str, &str)] = &[
    ("xmlns:cito", "http://purl.org/spar/cito/"),
    ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
    ("xmlns:dcterms", "http://purl.org/dc/terms/"),
    ("xmlns:foaf", "http://xmlns.com/foaf/0.1/"),
    ("xmlns:ore", "http://www.openarchives.org/ore/terms/"),
    ("xmlns:rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("xmlns:rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
];

const ORE_RESOURCE_MAP: &str = "http://www.openarchives.org/ore/terms/ResourceMap";
const ORE_AGGREGATION: &str = "http://www.openarchives.org/ore/terms/Aggregation";
const ORE_AGGREGATED_RESOURCE: &str = "http://www.openarchives.org/ore/terms/AggregatedResource";

/// Contents of one resource map
#[derive(Debug, Clone)]
pub struct ResourceMap<'a> {
    pub map_id: &'a str,
    pub metadata_id: &'a str,
    pub data_ids: &'a [String],
    pub cn_url: &'a str,
    pub modified: DateTime<Utc>,
}

impl ResourceMap<'_> {
    /// Identifiers the map aggregates, metadata first
    pub fn members(&self) -> Vec<String> {
        std::iter::once(self.metadata_id.to_string())
            .chain(self.data_ids.iter().cloned())
            .collect()
    }

    pub fn to_xml(&self) -> Result<String> {
        let uri = |pid: &str| resolve_url(self.cn_url, pid);
        let map_uri = uri(self.map_id);
        let aggregation_uri = format!("{map_uri}#aggregation");
        let metadata_uri = uri(self.metadata_id);

        let mut doc = Document::new("rdf:RDF", NAMESPACES);
        let root = doc.root();

        let map = description(&mut doc, root, &map_uri, ORE_RESOURCE_MAP);
        text(&mut doc, map, "dcterms:identifier", self.map_id);
        text(
            &mut doc,
            map,
            "dcterms:modified",
            &self.modified.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        text(&mut doc, map, "dc:format", "application/rdf+xml");
        doc.append_child(map, "ore:describes", &[("rdf:resource", &aggregation_uri)]);

        let aggregation = description(&mut doc, root, &aggregation_uri, ORE_AGGREGATION);
        text(&mut doc, aggregation, "dc:title", "DataONE Aggregation");
        for member in self.members() {
            doc.append_child(aggregation, "ore:aggregates", &[("rdf:resource", &uri(&member))]);
        }
        doc.append_child(aggregation, "ore:isDescribedBy", &[("rdf:resource", &map_uri)]);

        let metadata = description(&mut doc, root, &metadata_uri, ORE_AGGREGATED_RESOURCE);
        text(&mut doc, metadata, "dcterms:identifier", self.metadata_id);
        for data_id in self.data_ids {
            doc.append_child(metadata, "cito:documents", &[("rdf:resource", &uri(data_id))]);
        }
        doc.append_child(metadata, "ore:isAggregatedBy", &[("rdf:resource", &aggregation_uri)]);

        for data_id in self.data_ids {
            let data = description(&mut doc, root, &uri(data_id), ORE_AGGREGATED_RESOURCE);
            text(&mut doc, data, "dcterms:identifier", data_id);
            doc.append_child(data, "cito:isDocumentedBy", &[("rdf:resource", &metadata_uri)]);
            doc.append_child(data, "ore:isAggregatedBy", &[("rdf:resource", &aggregation_uri)]);
        }

        to_xml_string(&doc)
    }
}

fn description(doc: &mut Document, root: NodeId, about: &str, rdf_type: &str) -> NodeId {
    let node = doc.append_child(root, "rdf:Description", &[("rdf:about", about)]);
    doc.append_child(node, "rdf:type", &[("rdf:resource", rdf_type)]);
    node
}

fn text(doc: &mut Document, parent: NodeId, tag: &str, value: &str) {
    let node = doc.append_child(parent, tag, &[]);
    doc.set_text(node, value);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_map_links_metadata_and_data() {
        let data = vec!["urn:uuid:d1".to_string(), "urn:uuid:d2".to_string()];
        let map = ResourceMap {
            map_id: "resource_map_urn:uuid:m",
            metadata_id: "urn:uuid:eml",
            data_ids: &data,
            cn_url: "https://cn.dataone.org/cn",
            modified: Utc::now(),
        };
        assert_eq!(map.members(), vec!["urn:uuid:eml", "urn:uuid:d1", "urn:uuid:d2"]);

        let xml = map.to_xml().unwrap();
        assert_eq!(xml.matches("<ore:aggregates ").count(), 3);
        assert_eq!(xml.matches("<cito:documents ").count(), 2);
        assert_eq!(xml.matches("<cito:isDocumentedBy ").count(), 2);
        assert!(xml.contains("rdf:about=\"https://cn.dataone.org/cn/v2/resolve/resource_map_urn%3Auuid%3Am#aggregation\""));
        assert!(xml.contains("<dcterms:identifier>urn:uuid:eml</dcterms:identifier>"));
    }

    #[test]
    fn test_metadata_only_map() {
        let map = ResourceMap {
            map_id: "resource_map_urn:uuid:m",
            metadata_id: "urn:uuid:eml",
            data_ids: &[],
            cn_url: "https://cn",
            modified: Utc::now(),
        };
        let xml = map.to_xml().unwrap();
        assert_eq!(xml.matches("<ore:aggregates ").count(), 1);
        assert!(!xml.contains("cito:documents"));
    }
}
