//! RocksDB-backed revision store.
//!
//! Column families:
//! - `revisions`  : every revision of every document, keyed `doc_id \0 rev(8 bytes BE)`
//! - `heads`      : latest revision per document (bincode `HeadRecord`)
//! - `changes`    : commit feed keyed by sequence number (8 bytes BE)
//! - `attachments`: LZ4-compressed attachment payloads keyed by content id
//! - `meta`       : store-wide counters (last committed sequence)
//!
//! Every commit is a single `WriteBatch`: the revision, the head, the change
//! entry, new attachments and the sequence counter land together or not at all.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use super::attachments::CompressedAttachment;
use crate::document::FileRef;

const CF_REVISIONS: &str = "revisions";
const CF_HEADS: &str = "heads";
const CF_CHANGES: &str = "changes";
const CF_ATTACHMENTS: &str = "attachments";
const CF_META: &str = "meta";

const COLUMN_FAMILIES: &[&str] = &[CF_REVISIONS, CF_HEADS, CF_CHANGES, CF_ATTACHMENTS, CF_META];

const META_SEQUENCE: &[u8] = b"sequence";

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every commit (default: true)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gigboard_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: true,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Config for testing (small caches, no fsync).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }

    /// Same tuning, different directory.
    pub fn at(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }
}

/// Storage errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Compression error: {0}")]
    CompressionError(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

/// One revision of one document as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRevision {
    pub doc_id: String,
    pub rev: u64,
    /// Tombstone marker
    pub deleted: bool,
    /// User fields as JSON text (bincode cannot carry `serde_json::Value` directly)
    pub fields_json: String,
    pub files: BTreeMap<String, FileRef>,
}

/// Latest revision pointer for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRecord {
    pub rev: u64,
    pub deleted: bool,
}

/// One entry of the commit feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub seq: u64,
    pub doc_id: String,
    pub deleted: bool,
}

/// What `compact` removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub revisions_removed: u64,
    pub tombstones_removed: u64,
    pub changes_removed: u64,
    pub attachments_removed: u64,
}

/// A revision ready to be committed.
#[derive(Debug, Clone)]
pub struct RevisionWrite {
    pub doc_id: String,
    pub deleted: bool,
    pub fields_json: String,
    pub files: BTreeMap<String, FileRef>,
    /// New attachment payloads, keyed by content id
    pub attachments: Vec<(String, CompressedAttachment)>,
}

/// Append-only revision store.
pub struct RevisionStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
    /// Last committed sequence number (0 = empty store)
    sequence: AtomicU64,
    #[cfg(test)]
    fail_next_commit: std::sync::atomic::AtomicBool,
}

impl RevisionStore {
    /// Open the store at the configured path, creating it if missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        let sequence = Self::recover_sequence(&db)?;
        log::debug!(
            "Opened revision store at {} (sequence {sequence})",
            config.path.display()
        );

        Ok(Self {
            db,
            config,
            sequence: AtomicU64::new(sequence),
            #[cfg(test)]
            fail_next_commit: std::sync::atomic::AtomicBool::new(false),
        })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(DBCompressionType::Lz4);

        match name {
            CF_ATTACHMENTS | CF_CHANGES => {
                // Attachments are already LZ4; the feed is tiny and sequential.
                opts.set_compression_type(DBCompressionType::None);
            }
            CF_HEADS | CF_META => {
                opts.set_max_write_buffer_number(2);
            }
            _ => {
                opts.set_max_write_buffer_number(3);
            }
        }

        opts
    }

    fn recover_sequence(db: &DBWithThreadMode<SingleThreaded>) -> Result<u64, StoreError> {
        let cf = db
            .cf_handle(CF_META)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{CF_META}' not found")))?;
        match db.get_cf(&cf, META_SEQUENCE)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    // ─── Commits ──────────────────────────────────────────────────────

    /// Commit one revision atomically and return its sequence number.
    ///
    /// The in-memory sequence only advances after the batch is durable, so a
    /// failed write leaves the store exactly as it was.
    pub fn commit(&self, write: RevisionWrite) -> Result<u64, StoreError> {
        let cf_revisions = self.cf(CF_REVISIONS)?;
        let cf_heads = self.cf(CF_HEADS)?;
        let cf_changes = self.cf(CF_CHANGES)?;
        let cf_attachments = self.cf(CF_ATTACHMENTS)?;
        let cf_meta = self.cf(CF_META)?;

        let seq = self.sequence.load(Ordering::SeqCst) + 1;

        let revision = StoredRevision {
            doc_id: write.doc_id.clone(),
            rev: seq,
            deleted: write.deleted,
            fields_json: write.fields_json,
            files: write.files,
        };
        let head = HeadRecord {
            rev: seq,
            deleted: write.deleted,
        };
        let change = ChangeRecord {
            seq,
            doc_id: write.doc_id.clone(),
            deleted: write.deleted,
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_revisions, revision_key(&write.doc_id, seq), encode(&revision)?);
        batch.put_cf(&cf_heads, write.doc_id.as_bytes(), encode(&head)?);
        batch.put_cf(&cf_changes, seq.to_be_bytes(), encode(&change)?);
        for (content_id, attachment) in &write.attachments {
            batch.put_cf(&cf_attachments, content_id.as_bytes(), attachment.encode()?);
        }
        batch.put_cf(&cf_meta, META_SEQUENCE, seq.to_be_bytes());

        #[cfg(test)]
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::DatabaseError("injected write failure".to_string()));
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        self.sequence.store(seq, Ordering::SeqCst);
        Ok(seq)
    }

    /// Make the next commit fail before its batch reaches RocksDB.
    #[cfg(test)]
    pub(crate) fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    // ─── Reads ────────────────────────────────────────────────────────

    pub fn load_head(&self, doc_id: &str) -> Result<Option<HeadRecord>, StoreError> {
        let cf = self.cf(CF_HEADS)?;
        self.db
            .get_cf(&cf, doc_id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Load a specific revision, tombstones included.
    pub fn load_revision(&self, doc_id: &str, rev: u64) -> Result<StoredRevision, StoreError> {
        let cf = self.cf(CF_REVISIONS)?;
        match self.db.get_cf(&cf, revision_key(doc_id, rev))? {
            Some(bytes) => decode(&bytes),
            None => Err(StoreError::NotFound(format!("{doc_id}@{rev}"))),
        }
    }

    /// All retained revisions of a document, oldest first.
    pub fn history(&self, doc_id: &str) -> Result<Vec<StoredRevision>, StoreError> {
        let cf = self.cf(CF_REVISIONS)?;
        let prefix = revision_prefix(doc_id);

        let mut revisions = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            revisions.push(decode(&value)?);
        }
        Ok(revisions)
    }

    /// Every head record, live and tombstoned, in id order.
    pub fn heads(&self) -> Result<Vec<(String, HeadRecord)>, StoreError> {
        let cf = self.cf(CF_HEADS)?;
        let mut heads = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            let doc_id = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
            heads.push((doc_id, decode(&value)?));
        }
        Ok(heads)
    }

    /// Commit feed entries with a sequence number greater than `since`.
    pub fn changes_since(&self, since: u64) -> Result<Vec<ChangeRecord>, StoreError> {
        let cf = self.cf(CF_CHANGES)?;
        let start = since.saturating_add(1).to_be_bytes();

        let mut changes = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, Direction::Forward));
        for item in iter {
            let (_, value) = item?;
            changes.push(decode(&value)?);
        }
        Ok(changes)
    }

    pub fn attachment_exists(&self, content_id: &str) -> Result<bool, StoreError> {
        let cf = self.cf(CF_ATTACHMENTS)?;
        Ok(self.db.get_pinned_cf(&cf, content_id.as_bytes())?.is_some())
    }

    /// Load and decompress an attachment payload.
    pub fn load_attachment(&self, content_id: &str) -> Result<Vec<u8>, StoreError> {
        let cf = self.cf(CF_ATTACHMENTS)?;
        match self.db.get_cf(&cf, content_id.as_bytes())? {
            Some(bytes) => CompressedAttachment::decode(&bytes)?.decompress(),
            None => Err(StoreError::AttachmentNotFound(content_id.to_string())),
        }
    }

    // ─── Retention ────────────────────────────────────────────────────

    /// Purge superseded revisions, tombstoned documents, their feed entries
    /// and attachments no longer referenced by a live head.
    pub fn compact(&self) -> Result<CompactionStats, StoreError> {
        let cf_revisions = self.cf(CF_REVISIONS)?;
        let cf_heads = self.cf(CF_HEADS)?;
        let cf_changes = self.cf(CF_CHANGES)?;
        let cf_attachments = self.cf(CF_ATTACHMENTS)?;

        let mut stats = CompactionStats::default();
        let mut batch = WriteBatch::default();
        let mut live_heads = HashSet::new();
        let mut referenced = HashSet::new();

        for (doc_id, head) in self.heads()? {
            for revision in self.history(&doc_id)? {
                if head.deleted || revision.rev != head.rev {
                    batch.delete_cf(&cf_revisions, revision_key(&doc_id, revision.rev));
                    stats.revisions_removed += 1;
                } else {
                    referenced.extend(revision.files.values().map(|f| f.content_id.clone()));
                }
            }
            if head.deleted {
                batch.delete_cf(&cf_heads, doc_id.as_bytes());
                stats.tombstones_removed += 1;
            } else {
                live_heads.insert(head.rev);
            }
        }

        for item in self.db.iterator_cf(&cf_changes, IteratorMode::Start) {
            let (key, _) = item?;
            if !live_heads.contains(&decode_u64(&key)?) {
                batch.delete_cf(&cf_changes, &key);
                stats.changes_removed += 1;
            }
        }

        for item in self.db.iterator_cf(&cf_attachments, IteratorMode::Start) {
            let (key, _) = item?;
            let content_id = String::from_utf8_lossy(&key);
            if !referenced.contains(content_id.as_ref()) {
                batch.delete_cf(&cf_attachments, &key);
                stats.attachments_removed += 1;
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        Ok(stats)
    }

    /// Force memtables to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Last committed sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }
}

/// `doc_id \0`: ids never contain control characters, so the prefix is unambiguous.
fn revision_prefix(doc_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(doc_id.len() + 1);
    prefix.extend_from_slice(doc_id.as_bytes());
    prefix.push(0);
    prefix
}

fn revision_key(doc_id: &str, rev: u64) -> Vec<u8> {
    let mut key = revision_prefix(doc_id);
    key.extend_from_slice(&rev.to_be_bytes());
    key
}

fn decode_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    let buf: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::DeserializationError(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(buf))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::SerializationError(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(doc_id: &str, fields_json: &str) -> RevisionWrite {
        RevisionWrite {
            doc_id: doc_id.to_string(),
            deleted: false,
            fields_json: fields_json.to_string(),
            files: BTreeMap::new(),
            attachments: Vec::new(),
        }
    }

    fn tombstone(doc_id: &str) -> RevisionWrite {
        RevisionWrite {
            deleted: true,
            ..write(doc_id, "{}")
        }
    }

    #[test]
    fn test_store_open_empty() {
        let dir = tempdir().unwrap();
        let store = RevisionStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
        assert_eq!(store.sequence(), 0);
        assert!(store.heads().unwrap().is_empty());
        assert!(store.path().exists());
    }

    #[test]
    fn test_commit_and_load_head_revision() {
        let dir = tempdir().unwrap();
        let store = RevisionStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();

        let r1 = store.commit(write("job-1", r#"{"title":"a"}"#)).unwrap();
        let r2 = store.commit(write("job-1", r#"{"title":"b"}"#)).unwrap();
        assert_eq!((r1, r2), (1, 2));

        let head = store.load_head("job-1").unwrap().unwrap();
        assert_eq!(head.rev, 2);
        let latest = store.load_revision("job-1", head.rev).unwrap();
        assert_eq!(latest.fields_json, r#"{"title":"b"}"#);

        // Superseded revisions stay readable.
        assert_eq!(store.load_revision("job-1", 1).unwrap().fields_json, r#"{"title":"a"}"#);
        assert_eq!(store.history("job-1").unwrap().len(), 2);
    }

    #[test]
    fn test_tombstone_hides_latest() {
        let dir = tempdir().unwrap();
        let store = RevisionStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();

        store.commit(write("job-1", "{}")).unwrap();
        store.commit(tombstone("job-1")).unwrap();

        let head = store.load_head("job-1").unwrap().unwrap();
        assert!(head.deleted);
        assert!(store.load_revision("job-1", head.rev).unwrap().deleted);
        assert_eq!(store.history("job-1").unwrap().len(), 2);
    }

    #[test]
    fn test_failed_commit_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = RevisionStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
        store.commit(write("job-1", r#"{"title":"a"}"#)).unwrap();

        store.fail_next_commit();
        let mut failing = write("job-2", "{}");
        failing.attachments.push((
            "content-1".to_string(),
            CompressedAttachment::compress(None, b"photo"),
        ));
        assert!(matches!(store.commit(failing), Err(StoreError::DatabaseError(_))));

        assert_eq!(store.sequence(), 1);
        assert!(store.load_head("job-2").unwrap().is_none());
        assert!(!store.attachment_exists("content-1").unwrap());
        assert_eq!(store.changes_since(0).unwrap().len(), 1);

        // The hook fires once; the next commit reuses the sequence number.
        assert_eq!(store.commit(write("job-2", "{}")).unwrap(), 2);
        drop(store);
        let reopened = RevisionStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
        assert_eq!(reopened.sequence(), 2);
    }

    #[test]
    fn test_history_prefix_isolation() {
        let dir = tempdir().unwrap();
        let store = RevisionStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();

        store.commit(write("job", "{}")).unwrap();
        store.commit(write("job-2", "{}")).unwrap();
        store.commit(write("job", "{}")).unwrap();

        let history = store.history("job").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.doc_id == "job"));
        assert_eq!(history[0].rev, 1);
        assert_eq!(history[1].rev, 3);
    }

    #[test]
    fn test_changes_since() {
        let dir = tempdir().unwrap();
        let store = RevisionStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();

        for i in 0..5 {
            store.commit(write(&format!("job-{i}"), "{}")).unwrap();
        }
        store.commit(tombstone("job-0")).unwrap();

        let all = store.changes_since(0).unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].seq, 1);

        let recent = store.changes_since(4).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].doc_id, "job-4");
        assert!(recent[1].deleted);
    }

    #[test]
    fn test_sequence_recovery() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::for_testing(dir.path().join("db"));

        {
            let store = RevisionStore::open(config.clone()).unwrap();
            store.commit(write("a", "{}")).unwrap();
            store.commit(write("b", "{}")).unwrap();
            store.commit(tombstone("b")).unwrap();
            assert_eq!(store.sequence(), 3);
        }

        // Reopen: sequence continues, even after the tail was compacted away.
        {
            let store = RevisionStore::open(config.clone()).unwrap();
            assert_eq!(store.sequence(), 3);
            store.compact().unwrap();
        }
        {
            let store = RevisionStore::open(config).unwrap();
            assert_eq!(store.commit(write("c", "{}")).unwrap(), 4);
        }
    }

    #[test]
    fn test_attachment_commit_and_load() {
        let dir = tempdir().unwrap();
        let store = RevisionStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();

        let payload = vec![9u8; 4096];
        let mut files = BTreeMap::new();
        files.insert(
            "jobImage".to_string(),
            FileRef {
                content_id: "att-1".into(),
                size: payload.len() as u64,
                content_type: Some("image/png".into()),
            },
        );
        store
            .commit(RevisionWrite {
                files,
                attachments: vec![(
                    "att-1".into(),
                    CompressedAttachment::compress(Some("image/png".into()), &payload),
                )],
                ..write("job-1", "{}")
            })
            .unwrap();

        assert!(store.attachment_exists("att-1").unwrap());
        assert_eq!(store.load_attachment("att-1").unwrap(), payload);
        assert!(matches!(
            store.load_attachment("att-2"),
            Err(StoreError::AttachmentNotFound(_))
        ));
    }

    #[test]
    fn test_compact_retention() {
        let dir = tempdir().unwrap();
        let store = RevisionStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();

        let attach = |content_id: &str| {
            let mut files = BTreeMap::new();
            files.insert(
                "img".to_string(),
                FileRef {
                    content_id: content_id.into(),
                    size: 3,
                    content_type: None,
                },
            );
            RevisionWrite {
                files,
                attachments: vec![(content_id.into(), CompressedAttachment::compress(None, b"abc"))],
                ..write("keep", "{}")
            }
        };

        store.commit(attach("old")).unwrap(); // 1, superseded below
        store.commit(attach("new")).unwrap(); // 2
        store.commit(write("gone", "{}")).unwrap(); // 3
        store.commit(tombstone("gone")).unwrap(); // 4

        let stats = store.compact().unwrap();
        assert_eq!(stats.revisions_removed, 3);
        assert_eq!(stats.tombstones_removed, 1);
        assert_eq!(stats.changes_removed, 3);
        assert_eq!(stats.attachments_removed, 1);

        assert_eq!(store.history("keep").unwrap().len(), 1);
        assert!(store.load_head("gone").unwrap().is_none());
        assert!(store.attachment_exists("new").unwrap());
        assert!(!store.attachment_exists("old").unwrap());
        assert_eq!(store.changes_since(0).unwrap().len(), 1);
    }

    #[test]
    fn test_open_on_file_path_fails() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not_a_dir");
        std::fs::write(&file, b"occupied").unwrap();

        let result = RevisionStore::open(StoreConfig::for_testing(&file));
        assert!(matches!(result, Err(StoreError::DatabaseError(_))));
    }

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.block_cache_size, 64 * 1024 * 1024);
        assert_eq!(config.bloom_filter_bits, 10);
        assert!(config.sync_writes);

        let moved = config.at("elsewhere");
        assert_eq!(moved.path, PathBuf::from("elsewhere"));
        assert_eq!(moved.max_open_files, config.max_open_files);
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound("job-1".into());
        assert!(err.to_string().contains("not found"));

        let err = StoreError::DatabaseError("test".into());
        assert!(err.to_string().contains("Database error"));
    }
}
