//! Source-field to document-path mapping
//!
//! A [`Crosswalk`] is a list of [`FieldRule`]s. Each rule reads one dotted
//! path from a record and writes its value to one or more element paths
//! under `dataset`. Rules are plain data so a deployment can replace the
//! built-in table with a TOML file.

use super::html::html_to_lines;
use super::tree::{parse_path, PathSegment};
use crate::error::{ImportError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use emlx_common::types::SourceRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::warn;

/// How a source value lands in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Text of the target element, last write wins
    #[default]
    Text,
    /// One `para` child of the target per line
    Paragraphs,
    /// Source is an array; the last target segment is repeated per item
    List,
}

/// Value conversion applied before writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    None,
    /// Timestamp to `YYYY-MM-DD`
    Date,
    /// HTML fragment to plain text lines
    Html,
    /// `{name, url}` object to `"name (url)"`
    License,
}

/// One mapping from a record field to document paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub source: String,
    pub targets: Vec<String>,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub transform: Transform,
}

impl FieldRule {
    pub fn new(source: &str, targets: &[&str]) -> Self {
        Self {
            source: source.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            kind: FieldKind::Text,
            transform: Transform::None,
        }
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Values this rule produces for a record, empty when the field is absent
    pub fn values(&self, record: &SourceRecord) -> Vec<String> {
        let Some(value) = record.get_path(&self.source) else {
            return Vec::new();
        };

        let raw: Vec<String> = match (self.kind, self.transform) {
            (_, Transform::License) => license_text(value).into_iter().collect(),
            (FieldKind::List, _) => match value {
                Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
                other => scalar_text(other).into_iter().collect(),
            },
            _ => scalar_text(value).into_iter().collect(),
        };

        let converted: Vec<String> = raw
            .into_iter()
            .flat_map(|text| match self.transform {
                Transform::Date => vec![normalize_date(&text)],
                Transform::Html => html_to_lines(&text),
                Transform::None | Transform::License => match self.kind {
                    FieldKind::Paragraphs => text
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string)
                        .collect(),
                    _ => vec![text],
                },
            })
            .filter(|v| !v.trim().is_empty())
            .collect();

        match self.kind {
            // HTML that flattens to several lines is still one text value
            FieldKind::Text if converted.len() > 1 => vec![converted.join(" ")],
            _ => converted,
        }
    }
}

/// A rule with its target paths parsed
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: FieldRule,
    pub targets: Vec<Vec<PathSegment>>,
}

/// Ordered rule table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Crosswalk {
    #[serde(rename = "rule", default)]
    rules: Vec<FieldRule>,
}

impl Crosswalk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Built-in table for figshare article exports
    pub fn figshare() -> Self {
        Self::new()
            .rule(FieldRule::new(
                "url_public_html",
                &["alternateIdentifier", "distribution/online/url[function='information']"],
            ))
            .rule(FieldRule::new("doi", &["alternateIdentifier[system='https://doi.org']"]))
            .rule(FieldRule::new("title", &["title"]))
            .rule(FieldRule::new("published_date", &["pubDate"]).transform(Transform::Date))
            .rule(
                FieldRule::new("description", &["abstract"])
                    .kind(FieldKind::Paragraphs)
                    .transform(Transform::Html),
            )
            .rule(FieldRule::new("tags", &["keywordSet/keyword"]).kind(FieldKind::List))
            .rule(
                FieldRule::new("license", &["intellectualRights/para"])
                    .transform(Transform::License),
            )
    }

    /// Load a table from TOML (`[[rule]]` entries)
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let crosswalk: Self = toml::from_str(&content)
            .map_err(|e| ImportError::config(format!("invalid crosswalk '{}': {e}", path.display())))?;
        crosswalk.compile()?;
        Ok(crosswalk)
    }

    /// Parse every target path, failing on the first bad one
    pub fn compile(&self) -> Result<Vec<CompiledRule>> {
        self.rules
            .iter()
            .map(|rule| {
                if rule.targets.is_empty() {
                    return Err(ImportError::config(format!(
                        "crosswalk rule for '{}' has no targets",
                        rule.source
                    )));
                }
                let targets = rule
                    .targets
                    .iter()
                    .map(|t| parse_path(t))
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledRule {
                    rule: rule.clone(),
                    targets,
                })
            })
            .collect()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn license_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            let name = map.get("name").and_then(scalar_text)?;
            match map.get("url").and_then(scalar_text) {
                Some(url) => Some(format!("{name} ({url})")),
                None => Some(name),
            }
        },
        other => scalar_text(other),
    }
}

/// Reduce a timestamp to its calendar date
///
/// Unrecognized input is returned unchanged with a warning.
pub fn normalize_date(text: &str) -> String {
    let trimmed = text.trim();
    for format in ["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return dt.format("%Y-%m-%d").to_string();
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return dt.format("%Y-%m-%d").to_string();
    }
    if let Some(date) = trimmed.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
        return date.format("%Y-%m-%d").to_string();
    }
    warn!(value = text, "Unrecognized date format, keeping as-is");
    trimmed.to_string()
}
