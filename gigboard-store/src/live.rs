//! Live queries: subscriptions that re-deliver the current result set.
//!
//! ```text
//!  commit ──► mark_dirty(affected indexes) ──► dispatch()
//!                                               │
//!                      ┌────────────────────────┘
//!                      ▼
//!        running? ── yes ──► pending = true, return
//!                      │
//!                      no
//!                      ▼
//!        loop { take dirty subscriptions, re-run their query,
//!               deliver if (id, rev) signature changed }
//!        until no commit arrived during the round
//! ```
//!
//! Dispatch is single-flight. A commit made from inside a callback only
//! marks subscriptions dirty; the dispatcher already running picks them up
//! after the callback returns and computes the result fresh, so several
//! quick commits collapse into one delivery of the final state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::sync::watch;

use crate::document::{DocId, Document, Revision};
use crate::error::GigError;
use crate::index::{IndexSpec, QueryOptions};

/// One row of a query result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    /// Value of the indexed field
    pub key: Value,
    pub id: DocId,
    pub doc: Document,
}

/// An ordered query result, tagged with the store sequence it reflects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub seq: u64,
    pub rows: Vec<QueryRow>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.id.as_str()).collect()
    }

    pub fn docs(&self) -> impl Iterator<Item = &Document> {
        self.rows.iter().map(|row| &row.doc)
    }

    /// Membership, order and member revisions in one comparable value.
    fn signature(&self) -> Vec<(DocId, Revision)> {
        self.rows
            .iter()
            .map(|row| (row.id.clone(), row.doc.rev))
            .collect()
    }
}

/// Re-runs a subscription's query against the current store state.
pub type QueryRunner<'a> = dyn Fn(&IndexSpec, &QueryOptions) -> Result<QueryResult, GigError> + 'a;

type Callback = Box<dyn FnMut(&QueryResult) + Send>;

enum Sink {
    Callback(Callback),
    Watch(watch::Sender<QueryResult>),
}

struct Subscription {
    spec: IndexSpec,
    options: QueryOptions,
    active: AtomicBool,
    dirty: AtomicBool,
    last: Mutex<Option<Vec<(DocId, Revision)>>>,
    sink: Mutex<Sink>,
}

impl Subscription {
    /// Deliver `result` unless it matches what this subscriber last saw.
    ///
    /// Returns false when the subscriber has gone away.
    fn deliver(&self, result: QueryResult) -> bool {
        let signature = result.signature();
        {
            let mut last = lock(&self.last);
            if last.as_ref() == Some(&signature) {
                return true;
            }
            *last = Some(signature);
        }

        let mut sink = lock(&self.sink);
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        match &mut *sink {
            Sink::Callback(callback) => {
                callback(&result);
                true
            }
            Sink::Watch(sender) => sender.send(result).is_ok(),
        }
    }

    fn is_closed(&self) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return true;
        }
        match &*lock(&self.sink) {
            Sink::Watch(sender) => sender.is_closed(),
            Sink::Callback(_) => false,
        }
    }
}

/// Counters for monitoring live-query health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveStats {
    pub active_subscriptions: usize,
    pub deliveries: u64,
    pub dispatch_rounds: u64,
}

#[derive(Default)]
struct DispatchState {
    running: bool,
    pending: bool,
}

/// Resets the single-flight flag if a callback panics mid-dispatch.
struct DispatchGuard<'a> {
    state: &'a Mutex<DispatchState>,
    finished: bool,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = lock(self.state);
            state.running = false;
            state.pending = false;
        }
    }
}

/// Registry of live subscriptions for one database.
#[derive(Default)]
pub struct LiveQueries {
    next_id: AtomicU64,
    subscriptions: Mutex<BTreeMap<u64, Arc<Subscription>>>,
    dispatch: Mutex<DispatchState>,
    deliveries: AtomicU64,
    dispatch_rounds: AtomicU64,
}

impl LiveQueries {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a callback subscription. It is delivered on the next dispatch.
    pub fn subscribe<F>(
        self: &Arc<Self>,
        spec: IndexSpec,
        options: QueryOptions,
        callback: F,
    ) -> LiveQueryHandle
    where
        F: FnMut(&QueryResult) + Send + 'static,
    {
        self.insert(spec, options, Sink::Callback(Box::new(callback)), None)
    }

    /// Add a watch subscription seeded with `initial`.
    ///
    /// The subscription ends on its own once every receiver is dropped.
    pub fn watch(
        self: &Arc<Self>,
        spec: IndexSpec,
        options: QueryOptions,
        initial: QueryResult,
    ) -> (LiveQueryHandle, watch::Receiver<QueryResult>) {
        let signature = initial.signature();
        let (sender, receiver) = watch::channel(initial);
        let handle = self.insert(spec, options, Sink::Watch(sender), Some(signature));
        (handle, receiver)
    }

    fn insert(
        self: &Arc<Self>,
        spec: IndexSpec,
        options: QueryOptions,
        sink: Sink,
        last: Option<Vec<(DocId, Revision)>>,
    ) -> LiveQueryHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscription = Arc::new(Subscription {
            spec,
            options,
            active: AtomicBool::new(true),
            // Dirty so the first dispatch catches commits made since `initial`.
            dirty: AtomicBool::new(true),
            last: Mutex::new(last),
            sink: Mutex::new(sink),
        });
        lock(&self.subscriptions).insert(id, subscription);
        log::debug!("Live query {id} subscribed");

        LiveQueryHandle {
            id,
            live: Arc::downgrade(self),
        }
    }

    /// Flag every subscription over one of `indexes` for re-evaluation.
    pub fn mark_dirty(&self, indexes: &[IndexSpec]) {
        if indexes.is_empty() {
            return;
        }
        for subscription in lock(&self.subscriptions).values() {
            if indexes.contains(&subscription.spec) {
                subscription.dirty.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Deliver fresh results to every dirty subscription.
    ///
    /// If a dispatch is already running (on this thread from inside a
    /// callback, or on another thread) this only records that another
    /// round is needed and returns.
    pub fn dispatch(&self, run: &QueryRunner<'_>) {
        {
            let mut state = lock(&self.dispatch);
            if state.running {
                state.pending = true;
                return;
            }
            state.running = true;
            state.pending = false;
        }
        let mut guard = DispatchGuard {
            state: &self.dispatch,
            finished: false,
        };

        loop {
            self.dispatch_rounds.fetch_add(1, Ordering::Relaxed);
            let due: Vec<(u64, Arc<Subscription>)> = lock(&self.subscriptions)
                .iter()
                .filter(|(_, sub)| sub.dirty.swap(false, Ordering::SeqCst))
                .map(|(id, sub)| (*id, Arc::clone(sub)))
                .collect();

            for (id, subscription) in due {
                if subscription.is_closed() {
                    self.remove(id);
                    continue;
                }
                match run(&subscription.spec, &subscription.options) {
                    Ok(result) => {
                        if subscription.deliver(result) {
                            self.deliveries.fetch_add(1, Ordering::Relaxed);
                        } else {
                            self.remove(id);
                        }
                    }
                    Err(e) => log::warn!("Live query {id} could not be refreshed: {e}"),
                }
            }

            let mut state = lock(&self.dispatch);
            if !state.pending {
                state.running = false;
                guard.finished = true;
                break;
            }
            state.pending = false;
        }
    }

    fn remove(&self, id: u64) -> bool {
        match lock(&self.subscriptions).remove(&id) {
            Some(subscription) => {
                subscription.active.store(false, Ordering::SeqCst);
                log::debug!("Live query {id} unsubscribed");
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, id: u64) -> bool {
        lock(&self.subscriptions).contains_key(&id)
    }

    pub fn stats(&self) -> LiveStats {
        LiveStats {
            active_subscriptions: lock(&self.subscriptions).len(),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            dispatch_rounds: self.dispatch_rounds.load(Ordering::Relaxed),
        }
    }
}

/// Keeps a live query alive. Dropping it unsubscribes.
#[derive(Debug)]
pub struct LiveQueryHandle {
    id: u64,
    live: Weak<LiveQueries>,
}

impl LiveQueryHandle {
    /// Whether callbacks can still arrive.
    pub fn is_active(&self) -> bool {
        self.live
            .upgrade()
            .is_some_and(|live| live.is_subscribed(self.id))
    }

    /// Stop all further deliveries.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for LiveQueryHandle {
    fn drop(&mut self) {
        if let Some(live) = self.live.upgrade() {
            live.remove(self.id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
