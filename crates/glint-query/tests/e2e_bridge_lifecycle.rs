//! E2E bridge lifecycle tests.
//!
//! Validates, against a live reactive scope and cache:
//! 1. Exactly one observer construction per bridge, however often the
//!    configuration changes.
//! 2. Configuration is always applied silently; updates reach the view
//!    through the optimistic read in the same reactive batch.
//! 3. A disposed scope makes late engine completions invisible — the view
//!    holds its last pre-teardown snapshot.
//! 4. The full pending → success flow for a structured key.

#![forbid(unsafe_code)]

use std::cell::Cell;

use serde_json::json;

use glint_query::{
    DefaultedQueryOptions, NotifyListeners, QueryClient, QueryKey, QueryObserve, QueryObserver,
    QueryOptions, QueryResult, QueryStatus, create_base_query, create_query,
};
use glint_reactive::{Observable, Scope, Subscription, batch};

// ── Counting observer ───────────────────────────────────────────────────

thread_local! {
    static CREATED: Cell<u32> = const { Cell::new(0) };
    static LOUD_SET_OPTIONS: Cell<u32> = const { Cell::new(0) };
}

fn reset_counters() {
    CREATED.with(|c| c.set(0));
    LOUD_SET_OPTIONS.with(|c| c.set(0));
}

/// Plain observer wrapped with construction / notification counters.
struct CountingObserver<T>(QueryObserver<T>);

impl<T: Clone + 'static> QueryObserve<T> for CountingObserver<T> {
    fn create(
        client: &QueryClient,
        options: DefaultedQueryOptions<T>,
    ) -> glint_query::error::Result<Self> {
        CREATED.with(|c| c.set(c.get() + 1));
        Ok(Self(QueryObserver::create(client, options)?))
    }

    fn subscribe(&self, callback: impl Fn(&QueryResult<T>) + 'static) -> Subscription {
        self.0.subscribe(callback)
    }

    fn set_options(
        &self,
        options: DefaultedQueryOptions<T>,
        notify: NotifyListeners,
    ) -> glint_query::error::Result<()> {
        if notify == NotifyListeners::Yes {
            LOUD_SET_OPTIONS.with(|c| c.set(c.get() + 1));
        }
        self.0.set_options(options, notify)
    }

    fn optimistic_result(&self, options: &DefaultedQueryOptions<T>) -> QueryResult<T> {
        self.0.optimistic_result(options)
    }
}

fn page_key(page: u32) -> QueryKey {
    QueryKey::new(vec![json!("todos"), json!({ "page": page })]).unwrap()
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[test]
fn one_observer_per_bridge_across_config_changes() {
    reset_counters();
    let scope = Scope::new();
    let client = QueryClient::new();
    let page = Observable::new(1u32);

    let view = {
        let page = page.clone();
        create_base_query::<Vec<u32>, CountingObserver<Vec<u32>>, _>(&scope, &client, move |_| {
            let current = page.get();
            QueryOptions::new(page_key(current)).fetcher(move || Ok(vec![current]))
        })
        .unwrap()
    };
    assert_eq!(CREATED.with(Cell::get), 1);

    for next in 2..=5 {
        page.set(next);
        // Every change re-binds the same observer; the optimistic read for
        // the fresh entry lands immediately.
        assert_eq!(view.status(), QueryStatus::Pending);
        assert!(view.is_fetching());
    }
    assert_eq!(CREATED.with(Cell::get), 1);
    // The bridge never applies configuration loudly.
    assert_eq!(LOUD_SET_OPTIONS.with(Cell::get), 0);
}

#[test]
fn key_change_reuses_observer_and_rebinds() {
    reset_counters();
    let scope = Scope::new();
    let client = QueryClient::new();
    let page = Observable::new(1u32);

    let view = {
        let page = page.clone();
        create_base_query::<Vec<u32>, CountingObserver<Vec<u32>>, _>(&scope, &client, move |_| {
            let current = page.get();
            QueryOptions::new(page_key(current)).fetcher(move || Ok(vec![current * 10]))
        })
        .unwrap()
    };

    client.cache().dispatch::<Vec<u32>>(&page_key(1)).unwrap();
    assert_eq!(view.data(), Some(vec![10]));

    page.set(2);
    assert_eq!(CREATED.with(Cell::get), 1);
    // New entry, no data yet: the optimistic snapshot is pending again.
    assert_eq!(view.data(), None);
    assert!(view.is_pending());

    client.cache().dispatch::<Vec<u32>>(&page_key(2)).unwrap();
    assert_eq!(view.data(), Some(vec![20]));

    // Completions for the abandoned page-1 entry no longer reach the view.
    client.cache().dispatch::<Vec<u32>>(&page_key(1)).unwrap();
    assert_eq!(view.data(), Some(vec![20]));
}

#[test]
fn optimistic_write_lands_in_the_same_batch() {
    let scope = Scope::new();
    let client = QueryClient::new();
    let page = Observable::new(1u32);

    let view = {
        let page = page.clone();
        create_query::<u32, _>(&scope, &client, move |_| {
            let current = page.get();
            QueryOptions::new(page_key(current)).fetcher(move || Ok(current))
        })
        .unwrap()
    };
    client.cache().dispatch::<u32>(&page_key(1)).unwrap();
    assert_eq!(view.data(), Some(1));

    batch(|| {
        page.set(2);
        // Still inside the batch: the resolver has not flushed yet, so the
        // view holds the page-1 snapshot...
        assert_eq!(view.data(), Some(1));
    });
    // ...and at flush the optimistic write for page 2 is visible before
    // any dispatch for page 2 ran.
    assert_eq!(view.data(), None);
    assert!(view.is_pending());
    assert!(view.is_fetching());
}

#[test]
fn disposed_scope_ignores_late_completions() {
    let scope = Scope::new();
    let client = QueryClient::new();
    let key = QueryKey::of("slow").unwrap();

    let view = {
        let key = key.clone();
        create_query::<u32, _>(&scope, &client, move |_| {
            QueryOptions::new(key.clone()).fetcher(|| Ok(99))
        })
        .unwrap()
    };

    // Fetch starts, then the owning scope goes away mid-flight.
    let entry = client.cache().entry::<u32>(&key).unwrap();
    entry.begin_fetch();
    assert!(view.is_fetching());
    scope.dispose();

    // The late completion updates the cache, but nothing propagates.
    entry.complete(Ok(99));
    assert_eq!(entry.state().data, Some(99));
    assert_eq!(view.data(), None);
    assert!(view.is_pending());
    assert!(view.is_fetching());
}

#[test]
fn pending_to_success_flow() {
    let scope = Scope::new();
    let client = QueryClient::new();
    let key = QueryKey::of("todos").unwrap();

    #[derive(Debug, Clone, PartialEq)]
    struct Todo {
        id: u32,
    }

    let view = {
        let key = key.clone();
        create_query::<Vec<Todo>, _>(&scope, &client, move |_| {
            QueryOptions::new(key.clone()).fetcher(|| Ok(vec![Todo { id: 1 }]))
        })
        .unwrap()
    };

    // Immediately after creation: optimistic pending snapshot.
    assert_eq!(view.status(), QueryStatus::Pending);
    assert_eq!(view.data(), None);

    // The engine delivers the fetch outcome.
    client.cache().dispatch::<Vec<Todo>>(&key).unwrap();
    assert_eq!(view.status(), QueryStatus::Success);
    assert_eq!(view.data(), Some(vec![Todo { id: 1 }]));
    assert!(view.error().is_none());
    assert!(view.updated_at().is_some());
}

#[test]
fn fetch_failure_is_data_not_panic() {
    let scope = Scope::new();
    let client = QueryClient::new();
    let key = QueryKey::of("flaky").unwrap();

    let view = {
        let key = key.clone();
        create_query::<u32, _>(&scope, &client, move |_| {
            QueryOptions::new(key.clone())
                .fetcher(|| Err(glint_query::FetchError::new("connection refused")))
        })
        .unwrap()
    };

    client.cache().dispatch::<u32>(&key).unwrap();
    assert_eq!(view.status(), QueryStatus::Error);
    assert_eq!(view.error().unwrap().message(), "connection refused");
    assert_eq!(view.data(), None);
}

#[test]
fn downstream_effect_sees_one_update_per_batch() {
    let scope = Scope::new();
    let client = QueryClient::new();
    let key = QueryKey::of("todos").unwrap();

    let view = {
        let key = key.clone();
        create_query::<u32, _>(&scope, &client, move |_| {
            QueryOptions::new(key.clone()).fetcher(|| Ok(5))
        })
        .unwrap()
    };

    let observed = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let observed2 = std::rc::Rc::clone(&observed);
    let view2 = view.clone();
    let _effect = glint_reactive::Effect::new(move || {
        observed2.borrow_mut().push(view2.snapshot());
    });
    assert_eq!(observed.borrow().len(), 1);

    // Dispatch emits fetch-start and completion back to back; the batch
    // collapses them into one downstream update holding the final state.
    client.cache().dispatch::<u32>(&key).unwrap();
    let observed = observed.borrow();
    assert_eq!(observed.len(), 2);
    assert_eq!(observed[1].data, Some(5));
    assert_eq!(observed[1].status, QueryStatus::Success);
}
