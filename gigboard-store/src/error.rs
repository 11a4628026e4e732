use gigboard_core::{GenerationError, KindError};
use thiserror::Error;

use crate::storage::StoreError;

/// Errors surfaced by the database, draft controller and registry.
#[derive(Debug, Error)]
pub enum GigError {
    /// Malformed input to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Lookup or delete of an absent identifier.
    #[error("document not found: {0}")]
    NotFound(String),
    /// The storage medium failed; the store is left in its pre-call state.
    #[error("storage failure: {0}")]
    StorageFailure(#[source] StoreError),
    /// Draft submit with required fields left empty.
    #[error("validation failed, missing: {}", .missing.join(", "))]
    ValidationFailed { missing: Vec<String> },
    /// AI call error or unparsable structured response.
    #[error("generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),
    /// A response arrived for a draft that has since been submitted or reset.
    #[error("draft #{0} is no longer being edited")]
    StaleDraft(u64),
    /// The guarded action is already running.
    #[error("{0} is already in progress")]
    Busy(&'static str),
}

impl From<StoreError> for GigError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => GigError::NotFound(id),
            StoreError::AttachmentNotFound(id) => GigError::NotFound(format!("attachment {id}")),
            other => GigError::StorageFailure(other),
        }
    }
}

impl From<KindError> for GigError {
    fn from(e: KindError) -> Self {
        GigError::InvalidArgument(e.to_string())
    }
}
