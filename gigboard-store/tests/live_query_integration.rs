//! Live query integration tests.
//!
//! Verifies:
//! - A subscription's final state equals a fresh `query()` after mixed writes
//! - Deletes drop documents from every index result
//! - Equal sort keys come back in ascending id order
//! - Callbacks that write back into the database are delivered afterwards
//! - Watch channels follow the latest state across threads

use gigboard_store::{
    Database, GigError, IndexSpec, PutRequest, QueryOptions, QueryResult, StoreConfig,
};
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn open_db() -> (TempDir, Arc<Database>) {
    let dir = tempdir().unwrap();
    let db = Database::open("live", StoreConfig::for_testing(dir.path().join("db"))).unwrap();
    (dir, Arc::new(db))
}

fn job(id: &str, created_at: i64) -> PutRequest {
    PutRequest::default()
        .with_id(id)
        .set("type", "job")
        .set("createdAt", created_at)
}

/// Subscribe and keep every delivered result.
fn record(
    db: &Database,
    spec: IndexSpec,
    options: QueryOptions,
) -> (gigboard_store::LiveQueryHandle, Arc<Mutex<Vec<QueryResult>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handle = db
        .subscribe(spec, options, move |result: &QueryResult| {
            sink.lock().unwrap().push(result.clone());
        })
        .unwrap();
    (handle, seen)
}

fn last_ids(seen: &Mutex<Vec<QueryResult>>) -> Vec<String> {
    seen.lock()
        .unwrap()
        .last()
        .map(|r| r.ids().iter().map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

// ─── Ordering ────────────────────────────────────────────────────────────────

#[test]
fn test_descending_timestamps_live() {
    let (_dir, db) = open_db();
    let (_handle, seen) = record(&db, "createdAt".into(), QueryOptions::new().descending());

    db.put(job("t100", 100)).unwrap();
    db.put(job("t300", 300)).unwrap();
    db.put(job("t200", 200)).unwrap();

    assert_eq!(last_ids(&seen), vec!["t300", "t200", "t100"]);
}

#[test]
fn test_equal_sort_keys_ascending_ids() {
    let (_dir, db) = open_db();
    for id in ["delta", "alpha", "charlie", "bravo"] {
        db.put(job(id, 42)).unwrap();
    }

    let asc = db.query("createdAt", &QueryOptions::new()).unwrap();
    assert_eq!(asc.ids(), vec!["alpha", "bravo", "charlie", "delta"]);

    let desc = db
        .query("createdAt", &QueryOptions::new().descending())
        .unwrap();
    assert_eq!(desc.ids(), vec!["alpha", "bravo", "charlie", "delta"]);
}

// ─── Final state ─────────────────────────────────────────────────────────────

#[test]
fn test_final_state_matches_query_after_mixed_writes() {
    let (_dir, db) = open_db();
    let spec = IndexSpec::new("type").sorted_by("createdAt");
    let options = QueryOptions::new().key("job").descending();
    let (_handle, seen) = record(&db, spec.clone(), options.clone());

    // Deterministic pseudo-random mix of puts, updates and deletes.
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut live: Vec<String> = Vec::new();
    for step in 0..200 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let slot = (state % 12) as usize;
        let id = format!("doc-{slot:02}");

        if state % 5 == 0 && live.contains(&id) {
            db.del(&id).unwrap();
            live.retain(|l| l != &id);
        } else if state % 7 == 0 {
            // Moves the document out of the key filter.
            db.put(
                PutRequest::default()
                    .with_id(id.as_str())
                    .set("type", "note")
                    .set("createdAt", step),
            )
            .unwrap();
            if !live.contains(&id) {
                live.push(id);
            }
        } else {
            db.put(job(&id, (state % 50) as i64)).unwrap();
            if !live.contains(&id) {
                live.push(id);
            }
        }
    }

    let fresh = db.query(spec, &options).unwrap();
    let delivered = seen.lock().unwrap().last().cloned().unwrap();
    assert_eq!(delivered.ids(), fresh.ids());
    assert_eq!(delivered.rows, fresh.rows);
}

#[test]
fn test_delete_removes_from_every_index() {
    let (_dir, db) = open_db();
    let (_by_time, by_time) = record(&db, "createdAt".into(), QueryOptions::new());
    let (_by_type, by_type) = record(
        &db,
        IndexSpec::new("type").sorted_by("createdAt"),
        QueryOptions::new().key("job"),
    );

    db.put(job("a", 1)).unwrap();
    db.put(job("b", 2)).unwrap();
    assert_eq!(last_ids(&by_time), vec!["a", "b"]);
    assert_eq!(last_ids(&by_type), vec!["a", "b"]);

    db.del("a").unwrap();
    assert_eq!(last_ids(&by_time), vec!["b"]);
    assert_eq!(last_ids(&by_type), vec!["b"]);
    assert!(matches!(db.get("a"), Err(GigError::NotFound(_))));
    assert!(db.query("title", &QueryOptions::new()).unwrap().is_empty());
}

#[test]
fn test_update_redelivers_with_new_revision() {
    let (_dir, db) = open_db();
    db.put(job("a", 1).set("status", "Open")).unwrap();
    let (_handle, seen) = record(&db, "createdAt".into(), QueryOptions::new());

    db.put(job("a", 1).set("status", "Completed")).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].rows[0].doc.get_str("status"), Some("Completed"));
    assert!(seen[1].seq > seen[0].seq);
}

// ─── Re-entrancy ─────────────────────────────────────────────────────────────

#[test]
fn test_callback_writes_are_delivered_after_return() {
    let (_dir, db) = open_db();
    let seen = Arc::new(Mutex::new(Vec::<Vec<String>>::new()));
    let sink = Arc::clone(&seen);
    let writer = Arc::downgrade(&db);

    let _handle = db
        .subscribe("createdAt", QueryOptions::new(), move |result: &QueryResult| {
            sink.lock()
                .unwrap()
                .push(result.ids().iter().map(|s| s.to_string()).collect());
            // Echo the first document once.
            if result.len() == 1 {
                if let Some(db) = writer.upgrade() {
                    db.put(job("echo", 99)).unwrap();
                }
            }
        })
        .unwrap();

    db.put(job("first", 1)).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            Vec::<String>::new(),
            vec!["first".to_string()],
            vec!["first".to_string(), "echo".to_string()],
        ]
    );
}

#[test]
fn test_unsubscribe_stops_callbacks() {
    let (_dir, db) = open_db();
    let (handle, seen) = record(&db, "createdAt".into(), QueryOptions::new());
    db.put(job("a", 1)).unwrap();

    handle.unsubscribe();
    db.put(job("b", 2)).unwrap();
    db.del("a").unwrap();

    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(db.live_stats().active_subscriptions, 0);
}

// ─── Async ───────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_follows_writes_from_another_thread() {
    let (_dir, db) = open_db();
    let (_handle, mut rx) = db
        .watch("createdAt", QueryOptions::new().descending().limit(3))
        .unwrap();
    assert!(rx.borrow_and_update().is_empty());

    let writer = Arc::clone(&db);
    tokio::task::spawn_blocking(move || {
        for i in 0..10 {
            writer.put(job(&format!("w{i}"), i)).unwrap();
        }
    })
    .await
    .unwrap();

    // Latest-value semantics: whatever was skipped, the final state arrives.
    rx.changed().await.unwrap();
    let latest = rx.borrow_and_update().clone();
    assert_eq!(latest.ids(), vec!["w9", "w8", "w7"]);
    assert_eq!(latest.seq, 10);
}
