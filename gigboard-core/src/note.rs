use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{fields_of, from_fields_of, DocumentKind, Fields, KindError};

/// A saved AI response, listed through the `type == "note"` index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// RFC 3339 UTC timestamp with milliseconds.
    pub created_at: String,
}

impl Note {
    pub const TYPE: &'static str = "note";

    pub fn new(content: impl Into<String>) -> Self {
        Self {
            kind: Self::TYPE.to_string(),
            content: content.into(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl DocumentKind for Note {
    const KIND: &'static str = "note";

    fn to_fields(&self) -> Result<Fields, KindError> {
        fields_of(Self::KIND, self)
    }

    fn from_fields(fields: &Fields) -> Result<Self, KindError> {
        from_fields_of(Self::KIND, fields)
    }
}
