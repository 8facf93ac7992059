//! Loading the exported record list

use crate::error::{EmlxError, Result};
use crate::types::SourceRecord;
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Read every record from an export file
///
/// The export is either a bare array or an object whose `articles` key holds
/// the array. Every element must be an object.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<SourceRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EmlxError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let records = parse_records(&content)?;
    info!(path = %path.display(), count = records.len(), "Loaded metadata records");
    Ok(records)
}

/// Parse an export document already in memory
pub fn parse_records(content: &str) -> Result<Vec<SourceRecord>> {
    let document: Value = serde_json::from_str(content)?;
    let items = match document {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("articles") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(EmlxError::invalid_input(
                    "expected an array of records or an object with an 'articles' array",
                ))
            },
        },
        _ => {
            return Err(EmlxError::invalid_input(
                "expected an array of records or an object with an 'articles' array",
            ))
        },
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => Ok(SourceRecord::new(fields)),
            other => Err(EmlxError::invalid_input(format!(
                "record {index} is not an object but {}",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
