//! HTML description flattening
//!
//! Repository descriptions are HTML fragments. Block elements and `<br>`
//! become line breaks, every other tag is dropped, entities are decoded.

use scraper::{ElementRef, Html, Node};

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "table", "blockquote",
    "pre", "section",
];

/// Non-empty, trimmed lines of text in an HTML fragment
pub fn html_to_lines(html: &str) -> Vec<String> {
    let text = if html.contains('<') || html.contains('&') {
        let fragment = Html::parse_fragment(html);
        let mut out = String::new();
        collect_text(fragment.root_element(), &mut out);
        out
    } else {
        html.to_string()
    };

    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            Node::Element(el) => {
                let block = BLOCK_ELEMENTS.contains(&el.name());
                if block {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if block {
                    out.push('\n');
                }
            },
            _ => {},
        }
    }
}
