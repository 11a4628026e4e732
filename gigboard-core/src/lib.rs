use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod generate;
pub mod job;
pub mod note;

pub use generate::{
    demo_jobs_prompt, demo_jobs_schema, generate_typed, job_description_prompt, parse_structured,
    DemoJobs, GenerationError, Generator, OutputSchema, TemplateGenerator,
};
pub use job::{BudgetType, Job, JobCategory, JobStatus};
pub use note::Note;

/// Schema-less field mapping of a stored document.
pub type Fields = Map<String, Value>;

/// Errors raised when a field mapping does not fit a typed document.
#[derive(Debug, Error)]
pub enum KindError {
    #[error("{kind} document must serialize to a JSON object")]
    NotAnObject { kind: &'static str },
    #[error("invalid {kind} document: {source}")]
    Invalid {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A typed document variant stored over the schema-less [`Fields`] map.
///
/// Implementors are validated at the store boundary: writes go through
/// [`DocumentKind::to_fields`] and reads through [`DocumentKind::from_fields`].
pub trait DocumentKind: Sized {
    const KIND: &'static str;

    fn to_fields(&self) -> Result<Fields, KindError>;

    fn from_fields(fields: &Fields) -> Result<Self, KindError>;
}

/// Serialize any serde type into a field mapping.
pub fn fields_of<T: Serialize>(kind: &'static str, value: &T) -> Result<Fields, KindError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(KindError::NotAnObject { kind }),
        Err(source) => Err(KindError::Invalid { kind, source }),
    }
}

/// Deserialize a field mapping into any serde type.
pub fn from_fields_of<T: DeserializeOwned>(
    kind: &'static str,
    fields: &Fields,
) -> Result<T, KindError> {
    serde_json::from_value(Value::Object(fields.clone()))
        .map_err(|source| KindError::Invalid { kind, source })
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Whether a field counts as filled in: present, not null, and not blank text.
pub fn is_filled(fields: &Fields, name: &str) -> bool {
    match fields.get(name) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}
