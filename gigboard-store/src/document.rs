//! Document model: identifiers, revisions, attachment handles and writes.

use gigboard_core::Fields;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::GigError;

/// Store-assigned document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(String);

impl DocId {
    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate a caller-supplied identifier.
    ///
    /// Surrounding whitespace is trimmed; an empty result or a control
    /// character anywhere in the id is rejected.
    pub fn parse(raw: &str) -> Result<Self, GigError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(GigError::InvalidArgument(
                "document id is empty".to_string(),
            ));
        }
        if id.chars().any(char::is_control) {
            return Err(GigError::InvalidArgument(format!(
                "document id {id:?} contains control characters"
            )));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower bound for range scans; never a valid id.
    pub(crate) fn min() -> Self {
        Self(String::new())
    }

    /// Wrap an id read back from storage, where it was validated on write.
    pub(crate) fn from_stored(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Revision marker. Revisions are store-wide commit sequence numbers, so
/// they increase monotonically both per document and across the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolvable handle to a stored attachment.
///
/// The payload itself is fetched lazily through `Database::read_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    /// Key into the `attachments` column family
    pub content_id: String,
    /// Uncompressed size in bytes
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// An attachment payload waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// An attachment slot in a write: either new bytes or an existing handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEntry {
    Pending(Attachment),
    Stored(FileRef),
}

/// The latest live revision of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub rev: Revision,
    pub fields: Fields,
    pub files: BTreeMap<String, FileRef>,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn file(&self, name: &str) -> Option<&FileRef> {
        self.files.get(name)
    }

    /// JSON view with `_id`, `_rev` and `_files` alongside the user fields.
    pub fn to_json(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("_id".into(), Value::String(self.id.to_string()));
        map.insert("_rev".into(), Value::from(self.rev.0));
        if !self.files.is_empty() {
            let files = self
                .files
                .iter()
                .map(|(name, file)| {
                    (
                        name.clone(),
                        serde_json::to_value(file).unwrap_or(Value::Null),
                    )
                })
                .collect();
            map.insert("_files".into(), Value::Object(files));
        }
        Value::Object(map)
    }

    /// Start an update of this document, keeping its id and attachments.
    pub fn to_update(&self) -> PutRequest {
        PutRequest {
            id: Some(self.id.to_string()),
            fields: self.fields.clone(),
            files: self
                .files
                .iter()
                .map(|(name, file)| (name.clone(), FileEntry::Stored(file.clone())))
                .collect(),
        }
    }
}

/// A write handed to `Database::put`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutRequest {
    /// Existing id to update, or `None` to create.
    pub id: Option<String>,
    pub fields: Fields,
    pub files: BTreeMap<String, FileEntry>,
}

impl PutRequest {
    pub fn new(fields: Fields) -> Self {
        Self {
            id: None,
            fields,
            files: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn with_attachment(mut self, name: impl Into<String>, attachment: Attachment) -> Self {
        self.files
            .insert(name.into(), FileEntry::Pending(attachment));
        self
    }

    /// Parse a JSON object in the `to_json` layout.
    ///
    /// `_id` must be a string, `_rev` is ignored and `_files` must map names
    /// to stored handles. Any other underscore field is rejected.
    pub fn from_json(value: Value) -> Result<Self, GigError> {
        let Value::Object(mut map) = value else {
            return Err(GigError::InvalidArgument(
                "document must be a JSON object".to_string(),
            ));
        };

        let id = match map.remove("_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                return Err(GigError::InvalidArgument(format!(
                    "_id must be a string, got {other}"
                )))
            }
        };
        map.remove("_rev");

        let files = match map.remove("_files") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(files) => serde_json::from_value::<BTreeMap<String, FileRef>>(files)
                .map_err(|e| GigError::InvalidArgument(format!("_files: {e}")))?
                .into_iter()
                .map(|(name, file)| (name, FileEntry::Stored(file)))
                .collect(),
        };

        Ok(Self {
            id,
            fields: map,
            files,
        })
    }
}

impl From<Fields> for PutRequest {
    fn from(fields: Fields) -> Self {
        Self::new(fields)
    }
}

/// Outcome of a successful `put` or `del`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub id: DocId,
    pub rev: Revision,
}

/// Reject field names in the reserved `_` namespace.
pub(crate) fn check_field_names(fields: &Fields) -> Result<(), GigError> {
    match fields.keys().find(|k| k.starts_with('_') || k.is_empty()) {
        Some(name) => Err(GigError::InvalidArgument(format!(
            "field name {name:?} is reserved"
        ))),
        None => Ok(()),
    }
}
