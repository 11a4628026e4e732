//! # gigboard-store: Local document store with live queries and drafts
//!
//! Persists schema-less documents with revisions and attachments, keeps
//! secondary indexes in step with every commit, and pushes fresh query
//! results to subscribers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  submit   ┌──────────────────────────────────┐
//! │ DraftController  │ ────────► │ Database                         │
//! │ (one per form)   │   put     │  commit lock                     │
//! └──────────────────┘           │   ├─ RevisionStore (RocksDB)     │
//!                                │   ├─ head cache                  │
//!                                │   └─ IndexEngine                 │
//!                                └───────────────┬──────────────────┘
//!                                                │ mark_dirty + dispatch
//!                                                ▼
//!                                ┌──────────────────────────────────┐
//!                                │ LiveQueries                      │
//!                                │  callbacks / watch channels      │
//!                                └──────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`storage`]: RocksDB revision store and LZ4 attachments
//! - [`document`]: ids, revisions, documents and write requests
//! - [`index`]: ordered secondary indexes
//! - [`live`]: live-query subscriptions
//! - [`database`]: the store facade tying the above together
//! - [`draft`]: draft-document controller and busy guard
//! - [`registry`]: databases by name

pub mod database;
pub mod document;
pub mod draft;
pub mod error;
pub mod index;
pub mod live;
pub mod registry;
pub mod storage;

// Re-exports for convenience
pub use database::{Change, Database, RevisionInfo};
pub use document::{
    Attachment, DocId, Document, FileEntry, FileRef, PutRequest, PutResult, Revision,
};
pub use draft::{
    BusyFlag, BusyGuard, Draft, DraftBinding, DraftController, DraftDefaults, DraftPatch,
    DraftState, RequiredFields,
};
pub use error::GigError;
pub use index::{IndexSpec, IndexValue, QueryOptions};
pub use live::{LiveQueryHandle, LiveStats, QueryResult, QueryRow};
pub use registry::DatabaseRegistry;
pub use storage::{CompactionStats, StoreConfig, StoreError};
