//! Durable storage for documents and their attachments.
//!
//! ```text
//! ┌─────────────┐   RevisionWrite   ┌──────────────────────────────────────┐
//! │  Database   │ ────────────────► │ RevisionStore (RocksDB)              │
//! │ (cache +    │                   │                                      │
//! │  indexes)   │ ◄──── reads ───── │ CF "revisions"  : full history       │
//! └─────────────┘                   │ CF "heads"      : latest per doc     │
//!                                   │ CF "changes"    : commit feed        │
//!                                   │ CF "attachments": LZ4 payloads       │
//!                                   │ CF "meta"       : sequence counter   │
//!                                   └──────────────────────────────────────┘
//! ```

pub mod attachments;
pub mod rocks;

pub use attachments::CompressedAttachment;
pub use rocks::{
    ChangeRecord, CompactionStats, HeadRecord, RevisionStore, RevisionWrite, StoreConfig,
    StoreError, StoredRevision,
};
