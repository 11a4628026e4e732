//! The document database: revision store, index engine and live queries
//! behind one commit lock.
//!
//! A commit runs in three steps:
//!
//! 1. validate and write one `WriteBatch` to RocksDB (nothing else changes
//!    if this fails);
//! 2. update the head cache and every index the document had or now has an
//!    entry in;
//! 3. release the lock and dispatch live-query notifications.

use gigboard_core::{DocumentKind, Fields};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use uuid::Uuid;

use crate::document::{
    check_field_names, DocId, Document, FileEntry, FileRef, PutRequest, PutResult, Revision,
};
use crate::error::GigError;
use crate::index::{IndexEngine, IndexSpec, QueryOptions};
use crate::live::{LiveQueries, LiveQueryHandle, LiveStats, QueryResult, QueryRow};
use crate::storage::{
    CompactionStats, CompressedAttachment, RevisionStore, RevisionWrite, StoreConfig, StoreError,
    StoredRevision,
};

/// One entry of the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub seq: u64,
    pub id: DocId,
    pub rev: Revision,
    pub deleted: bool,
}

/// One retained revision of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionInfo {
    pub rev: Revision,
    pub deleted: bool,
}

struct State {
    store: RevisionStore,
    /// Latest live revision of every document
    docs: BTreeMap<DocId, Document>,
    indexes: IndexEngine,
}

/// A named local document database.
pub struct Database {
    name: String,
    state: Mutex<State>,
    live: Arc<LiveQueries>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("name", &self.name).finish()
    }
}

impl Database {
    /// Open (or create) a database and load its live heads.
    pub fn open(name: impl Into<String>, config: StoreConfig) -> Result<Self, GigError> {
        let name = name.into();
        let store = RevisionStore::open(config)?;

        let mut docs = BTreeMap::new();
        for (doc_id, head) in store.heads()? {
            if head.deleted {
                continue;
            }
            let doc = document_from(store.load_revision(&doc_id, head.rev)?)?;
            docs.insert(doc.id.clone(), doc);
        }

        log::info!(
            "Opened database '{name}' at {} ({} documents, sequence {})",
            store.path().display(),
            docs.len(),
            store.sequence()
        );

        Ok(Self {
            name,
            state: Mutex::new(State {
                store,
                docs,
                indexes: IndexEngine::new(),
            }),
            live: LiveQueries::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ─── Writes ───────────────────────────────────────────────────────

    /// Create a document (no id) or write a new revision of it (id given).
    pub fn put(&self, request: impl Into<PutRequest>) -> Result<PutResult, GigError> {
        let request = request.into();
        let id = match &request.id {
            Some(raw) => DocId::parse(raw)?,
            None => DocId::generate(),
        };
        check_field_names(&request.fields)?;
        let fields_json = serde_json::to_string(&request.fields)
            .map_err(|e| GigError::InvalidArgument(e.to_string()))?;

        let (affected, seq) = {
            let mut state = self.lock();

            let mut files = BTreeMap::new();
            let mut attachments = Vec::new();
            for (name, entry) in request.files {
                if name.is_empty() {
                    return Err(GigError::InvalidArgument(
                        "attachment name is empty".to_string(),
                    ));
                }
                let file = match entry {
                    FileEntry::Pending(attachment) => {
                        let content_id = Uuid::new_v4().to_string();
                        let file = FileRef {
                            content_id: content_id.clone(),
                            size: attachment.data.len() as u64,
                            content_type: attachment.content_type.clone(),
                        };
                        attachments.push((
                            content_id,
                            CompressedAttachment::compress(
                                attachment.content_type,
                                &attachment.data,
                            ),
                        ));
                        file
                    }
                    FileEntry::Stored(file) => {
                        if !state.store.attachment_exists(&file.content_id)? {
                            return Err(GigError::InvalidArgument(format!(
                                "attachment '{name}' refers to unknown content {}",
                                file.content_id
                            )));
                        }
                        file
                    }
                };
                files.insert(name, file);
            }

            let seq = state.store.commit(RevisionWrite {
                doc_id: id.to_string(),
                deleted: false,
                fields_json,
                files: files.clone(),
                attachments,
            })?;

            let doc = Document {
                id: id.clone(),
                rev: Revision(seq),
                fields: request.fields,
                files,
            };
            let affected = state.indexes.apply(&id, Some(&doc.fields));
            state.docs.insert(id.clone(), doc);
            log::trace!("put {id}@{seq}");
            (affected, seq)
        };

        self.notify(&affected);
        Ok(PutResult {
            id,
            rev: Revision(seq),
        })
    }

    /// Spread-update form: a JSON object with optional `_id` and `_files`.
    pub fn put_json(&self, value: Value) -> Result<PutResult, GigError> {
        self.put(PutRequest::from_json(value)?)
    }

    /// Write a typed document, validated through its [`DocumentKind`] mapping.
    pub fn put_kind<K: DocumentKind>(
        &self,
        id: Option<&str>,
        value: &K,
    ) -> Result<PutResult, GigError> {
        let mut request = PutRequest::new(value.to_fields()?);
        request.id = id.map(str::to_string);
        self.put(request)
    }

    /// Write a tombstone revision.
    pub fn del(&self, id: &str) -> Result<PutResult, GigError> {
        let id = DocId::parse(id)?;

        let (affected, seq) = {
            let mut state = self.lock();
            if !state.docs.contains_key(&id) {
                return Err(GigError::NotFound(id.to_string()));
            }

            let seq = state.store.commit(RevisionWrite {
                doc_id: id.to_string(),
                deleted: true,
                fields_json: "{}".to_string(),
                files: BTreeMap::new(),
                attachments: Vec::new(),
            })?;

            state.docs.remove(&id);
            let affected = state.indexes.apply(&id, None);
            log::trace!("del {id}@{seq}");
            (affected, seq)
        };

        self.notify(&affected);
        Ok(PutResult {
            id,
            rev: Revision(seq),
        })
    }

    // ─── Reads ────────────────────────────────────────────────────────

    /// Latest live revision.
    pub fn get(&self, id: &str) -> Result<Document, GigError> {
        let id = DocId::parse(id)?;
        self.lock()
            .docs
            .get(&id)
            .cloned()
            .ok_or_else(|| GigError::NotFound(id.to_string()))
    }

    /// Read back and validate a typed document.
    pub fn get_kind<K: DocumentKind>(&self, id: &str) -> Result<K, GigError> {
        let doc = self.get(id)?;
        Ok(K::from_fields(&doc.fields)?)
    }

    /// A specific retained revision; tombstones read as `NotFound`.
    pub fn get_revision(&self, id: &str, rev: Revision) -> Result<Document, GigError> {
        let id = DocId::parse(id)?;
        let stored = self.lock().store.load_revision(id.as_str(), rev.0)?;
        if stored.deleted {
            return Err(GigError::NotFound(format!("{id}@{rev}")));
        }
        document_from(stored)
    }

    /// Every retained revision of a document, oldest first.
    pub fn history(&self, id: &str) -> Result<Vec<RevisionInfo>, GigError> {
        let id = DocId::parse(id)?;
        let revisions = self.lock().store.history(id.as_str())?;
        if revisions.is_empty() {
            return Err(GigError::NotFound(id.to_string()));
        }
        Ok(revisions
            .into_iter()
            .map(|r| RevisionInfo {
                rev: Revision(r.rev),
                deleted: r.deleted,
            })
            .collect())
    }

    /// Resolve an attachment handle to its bytes.
    pub fn read_file(&self, file: &FileRef) -> Result<Vec<u8>, GigError> {
        Ok(self.lock().store.load_attachment(&file.content_id)?)
    }

    /// Live documents in ascending id order.
    pub fn all_docs(&self) -> Vec<Document> {
        self.lock().docs.values().cloned().collect()
    }

    /// Commits after `since`, oldest first.
    pub fn changes_since(&self, since: u64) -> Result<Vec<Change>, GigError> {
        let changes = self.lock().store.changes_since(since)?;
        Ok(changes
            .into_iter()
            .map(|c| Change {
                seq: c.seq,
                id: DocId::from_stored(c.doc_id),
                rev: Revision(c.seq),
                deleted: c.deleted,
            })
            .collect())
    }

    /// Last committed sequence number.
    pub fn sequence(&self) -> u64 {
        self.lock().store.sequence()
    }

    // ─── Indexes & queries ────────────────────────────────────────────

    /// Register an index and back-fill it. Idempotent; returns the index name.
    pub fn register_index(&self, spec: impl Into<IndexSpec>) -> Result<String, GigError> {
        let spec = spec.into();
        check_spec(&spec)?;
        let mut state = self.lock();
        Ok(register(&mut state, spec))
    }

    /// Run a query once. The index is registered on first use.
    pub fn query(
        &self,
        spec: impl Into<IndexSpec>,
        options: &QueryOptions,
    ) -> Result<QueryResult, GigError> {
        let spec = spec.into();
        check_spec(&spec)?;
        self.run_query(&spec, options)
    }

    /// Subscribe to a query. The callback receives the current result right
    /// away and again after every commit that changes it.
    pub fn subscribe<F>(
        &self,
        spec: impl Into<IndexSpec>,
        options: QueryOptions,
        callback: F,
    ) -> Result<LiveQueryHandle, GigError>
    where
        F: FnMut(&QueryResult) + Send + 'static,
    {
        let spec = spec.into();
        check_spec(&spec)?;
        register(&mut self.lock(), spec.clone());

        let handle = self.live.subscribe(spec, options, callback);
        self.dispatch();
        Ok(handle)
    }

    /// Latest-value stream of a query for async consumers.
    pub fn watch(
        &self,
        spec: impl Into<IndexSpec>,
        options: QueryOptions,
    ) -> Result<(LiveQueryHandle, watch::Receiver<QueryResult>), GigError> {
        let spec = spec.into();
        check_spec(&spec)?;
        let initial = self.run_query(&spec, &options)?;

        let watched = self.live.watch(spec, options, initial);
        self.dispatch();
        Ok(watched)
    }

    pub fn live_stats(&self) -> LiveStats {
        self.live.stats()
    }

    // ─── Maintenance ──────────────────────────────────────────────────

    /// Drop superseded revisions, tombstones and orphaned attachments.
    pub fn compact(&self) -> Result<CompactionStats, GigError> {
        let stats = self.lock().store.compact()?;
        log::info!(
            "Compacted '{}': {} revisions, {} tombstones, {} changes, {} attachments removed",
            self.name,
            stats.revisions_removed,
            stats.tombstones_removed,
            stats.changes_removed,
            stats.attachments_removed
        );
        Ok(stats)
    }

    /// Flush memtables to disk.
    pub fn sync(&self) -> Result<(), GigError> {
        Ok(self.lock().store.sync()?)
    }

    // ─── Internals ────────────────────────────────────────────────────

    #[cfg(test)]
    fn fail_next_commit(&self) {
        self.lock().store.fail_next_commit();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_query(&self, spec: &IndexSpec, options: &QueryOptions) -> Result<QueryResult, GigError> {
        let mut state = self.lock();
        let name = register(&mut state, spec.clone());

        let entries = state
            .indexes
            .query(spec, options)
            .ok_or_else(|| GigError::NotFound(format!("index {name}")))?;

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(doc) = state.docs.get(&entry.id) else {
                log::error!("Index {name} points at missing document {}", entry.id);
                continue;
            };
            rows.push(QueryRow {
                key: spec.key_of(&doc.fields).cloned().unwrap_or(Value::Null),
                id: entry.id.clone(),
                doc: doc.clone(),
            });
        }

        Ok(QueryResult {
            seq: state.store.sequence(),
            rows,
        })
    }

    fn notify(&self, affected: &[IndexSpec]) {
        self.live.mark_dirty(affected);
        self.dispatch();
    }

    fn dispatch(&self) {
        self.live
            .dispatch(&|spec, options| self.run_query(spec, options));
    }
}

fn register(state: &mut State, spec: IndexSpec) -> String {
    let name = spec.name();
    if !state.indexes.contains(&spec) {
        let State { docs, indexes, .. } = state;
        indexes.register(spec, docs.iter().map(|(id, doc)| (id, &doc.fields)));
    }
    name
}

fn check_spec(spec: &IndexSpec) -> Result<(), GigError> {
    if spec.field().trim().is_empty() || spec.sort().trim().is_empty() {
        return Err(GigError::InvalidArgument(
            "index field name is empty".to_string(),
        ));
    }
    Ok(())
}

fn document_from(stored: StoredRevision) -> Result<Document, GigError> {
    let fields: Fields = serde_json::from_str(&stored.fields_json)
        .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
    Ok(Document {
        id: DocId::from_stored(stored.doc_id),
        rev: Revision(stored.rev),
        fields,
        files: stored.files,
    })
}
