#![forbid(unsafe_code)]

//! Query observers: stateful subscriptions bound to one logical query key.
//!
//! [`QueryObserve`] is the contract the bridge is generic over, so plain
//! and paginated observer kinds plug into the same bridge.
//! [`QueryObserver`] is the plain implementation.
//!
//! # Invariants
//!
//! 1. An observer is bound to exactly one cache entry at a time; a key
//!    change re-binds it (the old entry subscription is dropped first).
//! 2. Applying options with [`NotifyListeners::Silent`] never fans out —
//!    the caller is expected to read
//!    [`optimistic_result`](QueryObserve::optimistic_result) instead.
//! 3. Fan-out runs inside a notification batch, so several synchronous
//!    engine emissions collapse into one downstream update per listener.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::debug;

use glint_reactive::{Subscription, batch};

use crate::cache::{QueryEntry, QueryState};
use crate::client::QueryClient;
use crate::error::{QueryError, Result};
use crate::options::{DefaultedQueryOptions, NotifyListeners};
use crate::result::{FetchStatus, QueryResult, QueryStatus};

/// The observer contract consumed by the bridge.
pub trait QueryObserve<T>: Sized {
    /// Construct an observer scoped to `client` and bound to the key in
    /// `options`. Fails on rejected configuration (missing fetcher with an
    /// empty cache, cache type conflict).
    fn create(client: &QueryClient, options: DefaultedQueryOptions<T>) -> Result<Self>;

    /// Register a callback on the observer's result stream.
    fn subscribe(&self, callback: impl Fn(&QueryResult<T>) + 'static) -> Subscription;

    /// Apply a new configuration to the existing observer, re-binding to a
    /// new cache entry when the key changed.
    fn set_options(&self, options: DefaultedQueryOptions<T>, notify: NotifyListeners) -> Result<()>;

    /// Compute a result for `options` synchronously from current cache
    /// state, without waiting for any engine round trip.
    fn optimistic_result(&self, options: &DefaultedQueryOptions<T>) -> QueryResult<T>;
}

// ─── Plain observer ──────────────────────────────────────────────────────────

struct ObserverListener<T> {
    key: u64,
    callback: Weak<dyn Fn(&QueryResult<T>)>,
}

struct ObserverInner<T> {
    client: QueryClient,
    options: RefCell<DefaultedQueryOptions<T>>,
    entry: RefCell<Rc<QueryEntry<T>>>,
    entry_sub: RefCell<Option<Subscription>>,
    listeners: RefCell<Vec<ObserverListener<T>>>,
    next_listener_key: Cell<u64>,
}

/// Plain (non-paginated) query observer.
pub struct QueryObserver<T> {
    inner: Rc<ObserverInner<T>>,
}

impl<T: Clone + 'static> QueryObserver<T> {
    /// Check that `options` can actually produce data for `entry`.
    fn validate(entry: &QueryEntry<T>, options: &DefaultedQueryOptions<T>) -> Result<()> {
        if options.fetcher.is_none() && !entry.has_fetcher() && !entry.has_data() {
            return Err(QueryError::MissingFetcher {
                key: options.key.to_string(),
            });
        }
        Ok(())
    }

    /// Subscribe `inner` to its current entry's state stream.
    fn bind(inner: &Rc<ObserverInner<T>>) {
        let entry = inner.entry.borrow().clone();
        let weak = Rc::downgrade(inner);
        let sub = entry.subscribe(move |state| {
            if let Some(inner) = weak.upgrade() {
                let result = result_from(state, &inner.options.borrow());
                Self::fan_out(&inner, &result);
            }
        });
        *inner.entry_sub.borrow_mut() = Some(sub);
    }

    /// Deliver `result` to every live listener, batched so synchronous
    /// bursts collapse downstream.
    fn fan_out(inner: &Rc<ObserverInner<T>>, result: &QueryResult<T>) {
        let live: Vec<Weak<dyn Fn(&QueryResult<T>)>> = {
            let mut listeners = inner.listeners.borrow_mut();
            listeners.retain(|listener| listener.callback.strong_count() > 0);
            listeners
                .iter()
                .map(|listener| listener.callback.clone())
                .collect()
        };
        if live.is_empty() {
            return;
        }
        batch(|| {
            for weak in live {
                if let Some(callback) = weak.upgrade() {
                    callback(result);
                }
            }
        });
    }

    /// The observer's view of the current cache state under its current
    /// options.
    #[must_use]
    pub fn current_result(&self) -> QueryResult<T> {
        let state = self.inner.entry.borrow().state();
        result_from(&state, &self.inner.options.borrow())
    }
}

impl<T: Clone + 'static> QueryObserve<T> for QueryObserver<T> {
    fn create(client: &QueryClient, options: DefaultedQueryOptions<T>) -> Result<Self> {
        let entry = client.cache().entry::<T>(&options.key)?;
        Self::validate(&entry, &options)?;
        entry.set_fetcher(options.fetcher.clone());
        debug!(key = %options.key, "query observer created");

        let inner = Rc::new(ObserverInner {
            client: client.clone(),
            options: RefCell::new(options),
            entry: RefCell::new(entry),
            entry_sub: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
            next_listener_key: Cell::new(1),
        });
        Self::bind(&inner);
        Ok(Self { inner })
    }

    fn subscribe(&self, callback: impl Fn(&QueryResult<T>) + 'static) -> Subscription {
        let callback: Rc<dyn Fn(&QueryResult<T>)> = Rc::new(callback);
        let key = self.inner.next_listener_key.get();
        self.inner.next_listener_key.set(key + 1);
        self.inner.listeners.borrow_mut().push(ObserverListener {
            key,
            callback: Rc::downgrade(&callback),
        });
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .listeners
                    .borrow_mut()
                    .retain(|listener| listener.key != key);
            }
            drop(callback);
        })
    }

    fn set_options(&self, options: DefaultedQueryOptions<T>, notify: NotifyListeners) -> Result<()> {
        let key_changed = self.inner.options.borrow().key.hash() != options.key.hash();
        if key_changed {
            let entry = self.inner.client.cache().entry::<T>(&options.key)?;
            Self::validate(&entry, &options)?;
            entry.set_fetcher(options.fetcher.clone());
            debug!(
                old_key = %self.inner.options.borrow().key,
                new_key = %options.key,
                "query observer re-bound",
            );
            // Drop the old entry subscription before installing the new
            // one so a stale entry can never reach the listeners.
            *self.inner.entry_sub.borrow_mut() = None;
            *self.inner.entry.borrow_mut() = entry;
            *self.inner.options.borrow_mut() = options;
            Self::bind(&self.inner);
        } else {
            let entry = self.inner.entry.borrow().clone();
            Self::validate(&entry, &options)?;
            entry.set_fetcher(options.fetcher.clone());
            *self.inner.options.borrow_mut() = options;
        }

        if notify == NotifyListeners::Yes {
            let result = self.current_result();
            Self::fan_out(&self.inner, &result);
        }
        Ok(())
    }

    fn optimistic_result(&self, options: &DefaultedQueryOptions<T>) -> QueryResult<T> {
        let state = self.inner.entry.borrow().state();
        result_from(&state, options)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for QueryObserver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryObserver")
            .field("key", &self.inner.options.borrow().key)
            .finish()
    }
}

/// Map entry state + options to the externally visible result.
///
/// `initial_data` serves as synchronous success data while the entry is
/// empty; a disabled query never reports an in-flight fetch; an optimistic
/// read of an empty, enabled, fetchable query reports the fetch the engine
/// is about to run.
fn result_from<T: Clone>(
    state: &QueryState<T>,
    options: &DefaultedQueryOptions<T>,
) -> QueryResult<T> {
    let mut data = state.data.clone();
    let mut status = state.status;
    if data.is_none() && state.error.is_none() {
        if let Some(initial) = &options.initial_data {
            data = Some(initial.clone());
            status = QueryStatus::Success;
        }
    }

    let fetch_status = if !options.enabled {
        FetchStatus::Idle
    } else if state.fetch_status == FetchStatus::Fetching {
        FetchStatus::Fetching
    } else if options.optimistic_results
        && data.is_none()
        && state.error.is_none()
        && options.fetcher.is_some()
    {
        FetchStatus::Fetching
    } else {
        FetchStatus::Idle
    };

    QueryResult {
        data,
        error: state.error.clone(),
        status,
        fetch_status,
        updated_at: state.updated_at,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::QueryKey;
    use crate::options::QueryOptions;
    use serde_json::json;

    fn defaulted(client: &QueryClient, key: &str) -> DefaultedQueryOptions<u32> {
        let mut options = client.defaulted_options(
            QueryOptions::new(QueryKey::of(key).unwrap()).fetcher(|| Ok(1)),
        );
        options.optimistic_results = true;
        options
    }

    #[test]
    fn create_requires_a_data_source() {
        let client = QueryClient::new();
        let options: DefaultedQueryOptions<u32> =
            client.defaulted_options(QueryOptions::new(QueryKey::of("todos").unwrap()));
        let err = QueryObserver::create(&client, options).unwrap_err();
        assert!(matches!(err, QueryError::MissingFetcher { .. }));
    }

    #[test]
    fn create_accepts_cached_data_without_fetcher() {
        let client = QueryClient::new();
        let key = QueryKey::of("todos").unwrap();
        client.cache().entry::<u32>(&key).unwrap().complete(Ok(3));

        let options: DefaultedQueryOptions<u32> =
            client.defaulted_options(QueryOptions::new(key));
        let observer = QueryObserver::create(&client, options).unwrap();
        assert_eq!(observer.current_result().data, Some(3));
    }

    #[test]
    fn subscriber_sees_completions() {
        let client = QueryClient::new();
        let observer = QueryObserver::create(&client, defaulted(&client, "todos")).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);
        let _sub = observer.subscribe(move |result| seen2.borrow_mut().push(result.clone()));

        let key = QueryKey::of("todos").unwrap();
        client.cache().entry::<u32>(&key).unwrap().complete(Ok(7));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].data, Some(7));
        assert!(seen[0].is_success());
    }

    #[test]
    fn silent_set_options_does_not_fan_out() {
        let client = QueryClient::new();
        let observer = QueryObserver::create(&client, defaulted(&client, "todos")).unwrap();
        let count = Rc::new(Cell::new(0u32));
        let count2 = Rc::clone(&count);
        let _sub = observer.subscribe(move |_| count2.set(count2.get() + 1));

        observer
            .set_options(defaulted(&client, "todos"), NotifyListeners::Silent)
            .unwrap();
        assert_eq!(count.get(), 0);

        observer
            .set_options(defaulted(&client, "todos"), NotifyListeners::Yes)
            .unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn key_change_rebinds_entry() {
        let client = QueryClient::new();
        let observer = QueryObserver::create(&client, defaulted(&client, "todos")).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);
        let _sub = observer.subscribe(move |result| seen2.borrow_mut().push(result.data));

        observer
            .set_options(defaulted(&client, "users"), NotifyListeners::Silent)
            .unwrap();

        // Old entry completions no longer reach the observer.
        let todos = QueryKey::of("todos").unwrap();
        client.cache().entry::<u32>(&todos).unwrap().complete(Ok(1));
        assert!(seen.borrow().is_empty());

        // New entry completions do.
        let users = QueryKey::of("users").unwrap();
        client.cache().entry::<u32>(&users).unwrap().complete(Ok(2));
        assert_eq!(*seen.borrow(), vec![Some(2)]);
    }

    #[test]
    fn optimistic_result_empty_entry_is_pending_fetching() {
        let client = QueryClient::new();
        let options = defaulted(&client, "todos");
        let observer = QueryObserver::create(&client, options.clone()).unwrap();

        let result = observer.optimistic_result(&options);
        assert!(result.is_pending());
        assert_eq!(result.data, None);
        assert!(result.is_fetching());
    }

    #[test]
    fn optimistic_result_disabled_is_idle() {
        let client = QueryClient::new();
        let mut options = defaulted(&client, "todos");
        options.enabled = false;
        let observer = QueryObserver::create(&client, options.clone()).unwrap();

        let result = observer.optimistic_result(&options);
        assert!(result.is_pending());
        assert!(!result.is_fetching());
    }

    #[test]
    fn initial_data_served_as_success() {
        let client = QueryClient::new();
        let mut options = defaulted(&client, "todos");
        options.initial_data = Some(42);
        let observer = QueryObserver::create(&client, options.clone()).unwrap();

        let result = observer.optimistic_result(&options);
        assert!(result.is_success());
        assert_eq!(result.data, Some(42));
    }

    #[test]
    fn structured_keys_bind_distinct_entries() {
        let client = QueryClient::new();
        let paged =
            QueryKey::new(vec![json!("todos"), json!({"page": 2})]).unwrap();
        let mut options = defaulted(&client, "todos");
        let observer = QueryObserver::create(&client, options.clone()).unwrap();

        options.key = paged.clone();
        observer
            .set_options(options, NotifyListeners::Silent)
            .unwrap();
        assert_eq!(client.cache().len(), 2);
    }
}
