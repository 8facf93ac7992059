use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// One dataset's exported metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRecord {
    fields: Map<String, Value>,
}

impl SourceRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Raw field access
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Resolve a dotted path such as `license.name` or `files.0.name`
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Non-empty text of a field; numbers and booleans are rendered
    pub fn text(&self, path: &str) -> Option<String> {
        self.get_path(path).and_then(value_text)
    }

    pub fn doi(&self) -> Option<String> {
        self.text("doi")
    }

    pub fn title(&self) -> Option<String> {
        self.text("title")
    }

    pub fn description(&self) -> Option<String> {
        self.text("description")
    }

    /// Stable identifier of the dataset: the DOI, else the numeric id
    pub fn dataset_id(&self) -> Option<String> {
        self.doi().or_else(|| self.text("id"))
    }

    pub fn group_id(&self) -> Option<u64> {
        self.get("group_id").and_then(Value::as_u64)
    }

    pub fn authors(&self) -> Vec<Person> {
        self.list_of("authors")
    }

    pub fn files(&self) -> Vec<FileRef> {
        self.list_of("files")
    }

    /// Replace the file list, carrying remote identifiers assigned by an upload
    pub fn set_files(&mut self, files: &[FileRef]) -> serde_json::Result<()> {
        let value = serde_json::to_value(files)?;
        self.fields.insert("files".to_string(), value);
        Ok(())
    }

    fn list_of<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Vec<T> {
        let Some(Value::Array(items)) = self.get(key) else {
            return Vec::new();
        };
        items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value(item.clone()) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(field = key, index, error = %e, "Skipping malformed entry");
                    None
                },
            })
            .collect()
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Empty strings in exports mean "absent"
fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// An author of a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    pub full_name: String,

    #[serde(deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub orcid_id: Option<String>,

    #[serde(deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub url_name: Option<String>,
}

/// A data file belonging to a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRef {
    pub name: String,
    pub size: u64,

    #[serde(deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub computed_md5: Option<String>,

    #[serde(deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub supplied_md5: Option<String>,

    #[serde(deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,

    #[serde(deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_link_only: bool,

    /// Identifier assigned by the member node once uploaded
    #[serde(
        alias = "pid",
        deserialize_with = "non_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_identifier: Option<String>,

    #[serde(
        alias = "d1_url",
        deserialize_with = "non_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_url: Option<String>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            ..Self::default()
        }
    }

    /// The checksum the source repository vouches for
    ///
    /// `computed_md5` wins over `supplied_md5`.
    pub fn declared_checksum(&self) -> Option<&str> {
        self.computed_md5
            .as_deref()
            .or(self.supplied_md5.as_deref())
    }

    /// Both digests present and different
    pub fn has_conflicting_checksums(&self) -> bool {
        match (&self.computed_md5, &self.supplied_md5) {
            (Some(computed), Some(supplied)) => !computed.eq_ignore_ascii_case(supplied),
            _ => false,
        }
    }
}
