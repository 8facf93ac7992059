//! Document serialization

use super::tree::{Document, NodeId};
use crate::error::{ImportError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// Serialize a document as indented UTF-8 XML with a declaration
pub fn to_xml_string(doc: &Document) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| ImportError::xml(e.to_string()))?;
    write_node(&mut writer, doc, doc.root())?;

    let mut xml = String::from_utf8(writer.into_inner()).map_err(|e| ImportError::xml(e.to_string()))?;
    xml.push('\n');
    Ok(xml)
}

fn write_node(writer: &mut Writer<Vec<u8>>, doc: &Document, id: NodeId) -> Result<()> {
    let node = doc.node(id);
    let mut start = BytesStart::new(node.tag.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.children.is_empty() && node.text.is_none() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| ImportError::xml(e.to_string()));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| ImportError::xml(e.to_string()))?;
    if let Some(text) = &node.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|e| ImportError::xml(e.to_string()))?;
    }
    for &child in &node.children {
        write_node(writer, doc, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(node.tag.as_str())))
        .map_err(|e| ImportError::xml(e.to_string()))
}
