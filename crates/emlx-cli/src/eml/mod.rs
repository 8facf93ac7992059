//! EML 2.2.0 document generation

pub mod builder;
pub mod crosswalk;
pub mod html;
pub mod tree;
pub mod writer;

pub use builder::{validate_required, ContactSettings, DocumentBuilder, EmlSettings, PublisherSettings};
pub use crosswalk::{Crosswalk, FieldKind, FieldRule, Transform};
pub use tree::{Document, NodeId, PathSegment};
pub use writer::to_xml_string;

use crate::error::{ImportError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// `packageId` of an existing EML document's root element
pub fn read_package_id(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(|e| ImportError::xml(e.to_string()))? {
            Event::Start(start) | Event::Empty(start) => {
                for attr in start.attributes() {
                    let attr = attr.map_err(|e| ImportError::xml(e.to_string()))?;
                    if attr.key.as_ref() == b"packageId" {
                        let value = attr
                            .unescape_value()
                            .map_err(|e| ImportError::xml(e.to_string()))?;
                        if !value.trim().is_empty() {
                            return Ok(value.trim().to_string());
                        }
                    }
                }
                return Err(ImportError::xml("root element has no packageId"));
            },
            Event::Eof => return Err(ImportError::xml("document has no root element")),
            _ => {},
        }
    }
}

const ENTITY_TAGS: &[&[u8]] = &[
    b"otherEntity",
    b"dataTable",
    b"spatialRaster",
    b"spatialVector",
    b"storedProcedure",
    b"view",
];

/// `id` attributes of the entity elements in an EML document, in order
pub fn read_entity_ids(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut ids = Vec::new();
    loop {
        match reader.read_event().map_err(|e| ImportError::xml(e.to_string()))? {
            Event::Start(start) | Event::Empty(start) => {
                if !ENTITY_TAGS.contains(&start.local_name().as_ref()) {
                    continue;
                }
                for attr in start.attributes() {
                    let attr = attr.map_err(|e| ImportError::xml(e.to_string()))?;
                    if attr.key.as_ref() == b"id" {
                        let value = attr
                            .unescape_value()
                            .map_err(|e| ImportError::xml(e.to_string()))?;
                        ids.push(value.into_owned());
                    }
                }
            },
            Event::Eof => return Ok(ids),
            _ => {},
        }
    }
}
