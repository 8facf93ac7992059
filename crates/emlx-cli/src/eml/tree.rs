//! Arena-backed XML element tree
//!
//! Nodes are addressed by [`NodeId`]. Looking up a child by tag and
//! attribute set goes through an index instead of scanning siblings, so
//! building a large document stays linear in the number of nodes.

use crate::error::{ImportError, Result};
use std::collections::HashMap;

pub type NodeId = usize;

/// One element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<NodeId>,
}

type IndexKey = (NodeId, String, Vec<(String, String)>);

/// Element tree with a single root
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    index: HashMap<IndexKey, NodeId>,
}

impl Document {
    pub fn new(root_tag: &str, attributes: &[(&str, &str)]) -> Self {
        Self {
            nodes: vec![Node {
                tag: root_tag.to_string(),
                attributes: owned(attributes),
                text: None,
                children: Vec::new(),
            }],
            index: HashMap::new(),
        }
    }

    pub const fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First child with this tag and attribute set, created if absent
    pub fn ensure_child(&mut self, parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let key = index_key(parent, tag, attributes);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        self.push(parent, tag, attributes, key)
    }

    /// New child even when an identical sibling exists
    pub fn append_child(&mut self, parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let key = index_key(parent, tag, attributes);
        self.push(parent, tag, attributes, key)
    }

    /// Walk a path from `parent`, reusing existing nodes at every step
    pub fn ensure_path(&mut self, parent: NodeId, path: &[PathSegment]) -> NodeId {
        path.iter().fold(parent, |node, segment| {
            self.ensure_child(node, &segment.tag, &segment.attribute_refs())
        })
    }

    /// Set element text, dropping characters XML 1.0 cannot carry
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id].text = Some(sanitize_text(text));
    }

    /// Children of `parent` with the given tag, in document order
    pub fn children_named<'a>(&'a self, parent: NodeId, tag: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .filter(move |&child| self.nodes[child].tag == tag)
    }

    /// Text of the first child with the given tag
    pub fn child_text(&self, parent: NodeId, tag: &str) -> Option<&str> {
        self.children_named(parent, tag)
            .next()
            .and_then(|id| self.nodes[id].text.as_deref())
    }

    /// Stable reorder of `parent`'s children by position of their tag in `order`
    ///
    /// Tags missing from `order` keep their relative order after the known ones.
    pub fn sort_children(&mut self, parent: NodeId, order: &[&str]) {
        let rank = |tag: &str| order.iter().position(|t| *t == tag).unwrap_or(order.len());
        let mut children = std::mem::take(&mut self.nodes[parent].children);
        children.sort_by_key(|&child| rank(&self.nodes[child].tag));
        self.nodes[parent].children = children;
    }

    fn push(&mut self, parent: NodeId, tag: &str, attributes: &[(&str, &str)], key: IndexKey) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            tag: tag.to_string(),
            attributes: owned(attributes),
            text: None,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        self.index.entry(key).or_insert(id);
        id
    }
}

fn owned(attributes: &[(&str, &str)]) -> Vec<(String, String)> {
    attributes
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn index_key(parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> IndexKey {
    let mut attrs = owned(attributes);
    attrs.sort();
    (parent, tag.to_string(), attrs)
}

/// Remove characters outside the XML 1.0 `Char` production
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}')
                || c >= '\u{10000}'
        })
        .collect()
}

/// One step of an element path: `tag` or `tag[attr='value']`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
}

impl PathSegment {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute_refs(&self) -> Vec<(&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Parse `a/b[attr='v']/c` into segments
///
/// Slashes inside brackets or quotes belong to attribute values.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let mut raw_segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in path.chars() {
        match (c, quote) {
            ('\'' | '"', None) if depth > 0 => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            ('[', None) => depth += 1,
            (']', None) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ImportError::config(format!("unbalanced ']' in path '{path}'")))?;
            },
            ('/', None) if depth == 0 => {
                raw_segments.push(std::mem::take(&mut current));
                continue;
            },
            _ => {},
        }
        current.push(c);
    }
    if depth != 0 || quote.is_some() {
        return Err(ImportError::config(format!("unterminated attribute in path '{path}'")));
    }
    raw_segments.push(current);

    raw_segments
        .iter()
        .map(|segment| parse_segment(segment, path))
        .collect()
}

fn parse_segment(segment: &str, path: &str) -> Result<PathSegment> {
    let invalid = || ImportError::config(format!("invalid segment '{segment}' in path '{path}'"));
    let (tag, mut rest) = match segment.find('[') {
        Some(idx) => (&segment[..idx], &segment[idx..]),
        None => (segment, ""),
    };
    if tag.is_empty() || tag.contains(char::is_whitespace) {
        return Err(invalid());
    }

    let mut parsed = PathSegment::new(tag);
    while let Some(body) = rest.strip_prefix('[') {
        let (name, after_eq) = body.split_once('=').ok_or_else(invalid)?;
        let name = name.trim();
        if name.is_empty() || name.contains(['[', ']', ' ']) {
            return Err(invalid());
        }
        let after_eq = after_eq.trim_start();
        let q = after_eq
            .chars()
            .next()
            .filter(|c| matches!(c, '\'' | '"'))
            .ok_or_else(invalid)?;
        let value_body = &after_eq[1..];
        let close = value_body.find(q).ok_or_else(invalid)?;
        parsed
            .attributes
            .push((name.to_string(), value_body[..close].to_string()));
        rest = value_body[close + 1..]
            .trim_start()
            .strip_prefix(']')
            .ok_or_else(invalid)?;
    }
    if !rest.is_empty() {
        return Err(invalid());
    }
    Ok(parsed)
}
