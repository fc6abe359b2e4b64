#![forbid(unsafe_code)]

//! The cache: one type-erased entry per query key hash.
//!
//! Each [`QueryEntry`] holds the authoritative [`QueryState`] for its key
//! plus a listener list; observers subscribe to the entry for the key they
//! are currently bound to. Fetch *scheduling* (retry, dedup, backoff,
//! transport) lives outside this crate — [`QueryEntry::run_fetch`] is the
//! synchronous stand-in an executor (or a test) uses to deliver a
//! completion on the single reactive thread.
//!
//! # Invariants
//!
//! 1. One entry per key hash; repeated lookups return the same entry.
//! 2. An entry's data type is fixed at creation; a lookup with a different
//!    type is a configuration error, not a panic.
//! 3. State transitions notify listeners after the state borrow is
//!    released; listeners may re-read the entry freely.
//! 4. A completion with no live listeners updates state and notifies
//!    nobody.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tracing::{debug, trace};
use web_time::Instant;

use glint_reactive::{Subscription, batch};

use crate::error::{FetchError, QueryError, Result};
use crate::key::{QueryKey, QueryKeyHash};
use crate::options::Fetcher;
use crate::result::{FetchStatus, QueryStatus};

// ─── Entry state ─────────────────────────────────────────────────────────────

/// Authoritative per-key state, owned by the cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub error: Option<FetchError>,
    pub status: QueryStatus,
    pub fetch_status: FetchStatus,
    pub updated_at: Option<Instant>,
}

impl<T> QueryState<T> {
    fn empty() -> Self {
        Self {
            data: None,
            error: None,
            status: QueryStatus::Pending,
            fetch_status: FetchStatus::Idle,
            updated_at: None,
        }
    }
}

// ─── Entry ───────────────────────────────────────────────────────────────────

struct EntryListener<T> {
    key: u64,
    callback: Weak<dyn Fn(&QueryState<T>)>,
}

/// One cached query: state, fetcher, listeners.
pub struct QueryEntry<T> {
    key: QueryKey,
    state: RefCell<QueryState<T>>,
    fetcher: RefCell<Option<Fetcher<T>>>,
    listeners: RefCell<Vec<EntryListener<T>>>,
    next_listener_key: Cell<u64>,
}

impl<T: Clone + 'static> QueryEntry<T> {
    fn new(key: QueryKey) -> Rc<Self> {
        Rc::new(Self {
            key,
            state: RefCell::new(QueryState::empty()),
            fetcher: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
            next_listener_key: Cell::new(1),
        })
    }

    #[must_use]
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn has_data(&self) -> bool {
        self.state.borrow().data.is_some()
    }

    #[must_use]
    pub fn has_fetcher(&self) -> bool {
        self.fetcher.borrow().is_some()
    }

    /// Install (or replace) the fetcher used by [`run_fetch`]. Passing
    /// `None` keeps any previously installed fetcher.
    ///
    /// [`run_fetch`]: Self::run_fetch
    pub fn set_fetcher(&self, fetcher: Option<Fetcher<T>>) {
        if let Some(fetcher) = fetcher {
            *self.fetcher.borrow_mut() = Some(fetcher);
        }
    }

    /// Register a state listener. Listeners are held weakly; the returned
    /// guard keeps the callback alive and removes it on drop.
    #[must_use]
    pub fn subscribe(self: &Rc<Self>, callback: impl Fn(&QueryState<T>) + 'static) -> Subscription {
        let callback: Rc<dyn Fn(&QueryState<T>)> = Rc::new(callback);
        let key = self.next_listener_key.get();
        self.next_listener_key.set(key + 1);
        self.listeners.borrow_mut().push(EntryListener {
            key,
            callback: Rc::downgrade(&callback),
        });
        let weak_entry = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(entry) = weak_entry.upgrade() {
                entry
                    .listeners
                    .borrow_mut()
                    .retain(|listener| listener.key != key);
            }
            drop(callback);
        })
    }

    /// Mark a fetch as in flight. No-op if one already is.
    pub fn begin_fetch(&self) {
        let changed = {
            let mut state = self.state.borrow_mut();
            if state.fetch_status == FetchStatus::Fetching {
                false
            } else {
                state.fetch_status = FetchStatus::Fetching;
                true
            }
        };
        if changed {
            trace!(key = %self.key, "fetch started");
            self.notify();
        }
    }

    /// Deliver a fetch outcome: success replaces data and stamps
    /// `updated_at`; failure records the error and keeps any previous
    /// data.
    pub fn complete(&self, outcome: std::result::Result<T, FetchError>) {
        {
            let mut state = self.state.borrow_mut();
            state.fetch_status = FetchStatus::Idle;
            match outcome {
                Ok(data) => {
                    state.data = Some(data);
                    state.error = None;
                    state.status = QueryStatus::Success;
                    state.updated_at = Some(Instant::now());
                }
                Err(error) => {
                    state.error = Some(error);
                    state.status = QueryStatus::Error;
                }
            }
        }
        trace!(key = %self.key, "fetch completed");
        self.notify();
    }

    /// Run the installed fetcher once and deliver its outcome, batching the
    /// start/complete transitions so downstream subscribers observe a
    /// single collapsed update.
    pub fn run_fetch(&self) -> Result<()> {
        let fetcher = self
            .fetcher
            .borrow()
            .clone()
            .ok_or_else(|| QueryError::MissingFetcher {
                key: self.key.to_string(),
            })?;
        batch(|| {
            self.begin_fetch();
            self.complete(fetcher());
        });
        Ok(())
    }

    fn notify(&self) {
        // Snapshot live listeners (pruning dead ones) so callbacks may
        // mutate the listener list.
        let live: Vec<Weak<dyn Fn(&QueryState<T>)>> = {
            let mut listeners = self.listeners.borrow_mut();
            listeners.retain(|listener| listener.callback.strong_count() > 0);
            listeners
                .iter()
                .map(|listener| listener.callback.clone())
                .collect()
        };
        if live.is_empty() {
            return;
        }
        let state = self.state.borrow().clone();
        for weak in live {
            if let Some(callback) = weak.upgrade() {
                callback(&state);
            }
        }
    }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Key-hash → entry map. Cheap to clone; all clones share the same map.
#[derive(Clone)]
pub struct QueryCache {
    entries: Rc<RefCell<AHashMap<QueryKeyHash, Rc<dyn Any>>>>,
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(AHashMap::new())),
        }
    }

    /// Get or create the entry for `key`.
    pub fn entry<T: Clone + 'static>(&self, key: &QueryKey) -> Result<Rc<QueryEntry<T>>> {
        let mut entries = self.entries.borrow_mut();
        if let Some(existing) = entries.get(key.hash()) {
            return Rc::clone(existing)
                .downcast::<QueryEntry<T>>()
                .map_err(|_| QueryError::EntryTypeMismatch {
                    key: key.to_string(),
                });
        }
        debug!(key = %key, "cache entry created");
        let entry = QueryEntry::new(key.clone());
        entries.insert(key.hash().clone(), Rc::clone(&entry) as Rc<dyn Any>);
        Ok(entry)
    }

    /// Run the fetcher for `key`'s entry, delivering its outcome to the
    /// entry's listeners. The stand-in for the engine's async executor.
    pub fn dispatch<T: Clone + 'static>(&self, key: &QueryKey) -> Result<()> {
        self.entry::<T>(key)?.run_fetch()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl<T> std::fmt::Debug for QueryEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEntry")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
