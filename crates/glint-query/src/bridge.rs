#![forbid(unsafe_code)]

//! The bridge between a query observer and the reactive cell system.
//!
//! # Design
//!
//! [`create_base_query`] wires two unidirectional channels:
//!
//! - **input**: an options-resolver [`Effect`] re-runs the caller's
//!   producer whenever a reactive value it reads changes, applies client
//!   defaults, and writes the engine-ready configuration into a
//!   transitional cell;
//! - **output**: a lifecycle [`Effect`] consumes that cell, owning the one
//!   observer for this bridge (created lazily on the first resolved
//!   configuration, re-configured rather than replaced on every later one)
//!   and writes result snapshots into the result cell, both from the
//!   observer's subscription stream and from a synchronous optimistic read
//!   after every configuration application.
//!
//! No write path leads from the output channel back into the input one:
//! configuration is applied with [`NotifyListeners::Silent`], and all
//! engine interaction runs under [`untrack`] so engine-side reads never
//! become dependencies of the lifecycle effect. Result-cell writes can
//! therefore re-trigger anything reading the result, but never a
//! re-resolution.
//!
//! A configuration change that only touches reactive inputs *inside* the
//! producer flows through both the resolver re-run and the immediate
//! optimistic write; the result cell collapses the pair when the snapshots
//! are equal.
//!
//! # Lifecycle
//!
//! Unstarted (result cell holds the initial pending snapshot) → Active
//! (first configuration resolved; observer exists) → Destroyed (owning
//! scope disposed: effects and the stream subscription are dropped, and no
//! later engine callback can write the result cell again). There is no way
//! back from Destroyed.
//!
//! # Errors
//!
//! A configuration rejected at bridge creation returns `Err`. A
//! configuration rejected on a later re-resolution panics out of the write
//! that triggered it — the resolution runs inside the writer's reactive
//! context, and rejected reconfiguration of a live bridge is a caller bug.
//! Query *execution* failures never surface here; they ride the snapshot.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use glint_reactive::{Effect, Observable, Scope, untrack};

use crate::client::QueryClient;
use crate::error::{QueryError, Result};
use crate::observer::{QueryObserve, QueryObserver};
use crate::options::{NotifyListeners, QueryOptions};
use crate::result::QueryResult;
use crate::view::QueryResultView;

/// Create a query bridge owned by `scope`, generic over the observer kind.
///
/// `options_fn` is re-invoked whenever any observable it reads changes;
/// the resulting configuration is applied to the bridge's single observer
/// and an optimistic result becomes visible in the same reactive batch.
///
/// # Panics
///
/// Panics when called on a disposed scope (usage error), or when a later
/// re-resolution produces a configuration the observer rejects.
pub fn create_base_query<T, O, F>(
    scope: &Scope,
    client: &QueryClient,
    options_fn: F,
) -> Result<QueryResultView<T>>
where
    T: Clone + PartialEq + 'static,
    O: QueryObserve<T> + 'static,
    F: Fn(&QueryClient) -> QueryOptions<T> + 'static,
{
    assert!(
        !scope.is_disposed(),
        "create_base_query called on a disposed scope"
    );
    let handle = scope.handle();

    // Transitional slot: `None` until the first resolution. A tagged
    // option rather than a marker value, so "not resolved yet" stays
    // distinguishable from any legitimate configuration.
    let defaulted = Observable::new(None);
    let result = Observable::new(QueryResult::<T>::pending());

    // ─── Options resolver ────────────────────────────────────────────────
    // Reads the producer (tracked), writes the transitional slot. The
    // write is memoization of a derived value, not new input.
    let resolver = {
        let client = client.clone();
        let defaulted = defaulted.clone();
        Effect::new(move || {
            let mut options = client.defaulted_options(options_fn(&client));
            options.optimistic_results = true;
            trace!(key = %options.key, "query options resolved");
            defaulted.set(Some(options));
        })
    };

    // ─── Observer lifecycle + result propagation ─────────────────────────
    let error_slot: Rc<RefCell<Option<QueryError>>> = Rc::new(RefCell::new(None));
    let lifecycle = {
        let client = client.clone();
        let defaulted = defaulted.clone();
        let result = result.clone();
        let error_slot = Rc::clone(&error_slot);
        let mut observer: Option<O> = None;
        let mut first_run = true;

        Effect::new(move || {
            // The transitional slot is this effect's only dependency.
            let Some(options) = defaulted.get() else {
                return;
            };
            // Engine-side reads must not register as dependencies of this
            // effect: a result write reaching back into the resolver would
            // close the feedback loop this bridge exists to prevent.
            let outcome = untrack(|| -> Result<()> {
                if observer.is_none() {
                    let created = O::create(&client, options.clone())?;
                    let stream_sub = created.subscribe({
                        let result = result.clone();
                        move |snapshot| {
                            trace!("query result propagated");
                            result.set(snapshot.clone());
                        }
                    });
                    // The stream subscription is released exactly once,
                    // when the owning scope is torn down.
                    handle.on_cleanup(move || drop(stream_sub));
                    observer = Some(created);
                    debug!(key = %options.key, "query bridge active");
                }

                let live = observer.as_ref().expect("observer installed above");
                // Configuration changes are reflected through the
                // optimistic read below, not the subscription stream.
                live.set_options(options.clone(), NotifyListeners::Silent)?;
                result.set(live.optimistic_result(&options));
                Ok(())
            });

            match outcome {
                Ok(()) => {}
                Err(err) if first_run => *error_slot.borrow_mut() = Some(err),
                Err(err) => panic!("query configuration rejected after update: {err}"),
            }
            first_run = false;
        })
    };

    if let Some(err) = error_slot.borrow_mut().take() {
        // Effects are dropped here; nothing was parked in the scope except
        // a possible stream-subscription cleanup, which is inert once the
        // subscription guard is gone.
        drop(resolver);
        drop(lifecycle);
        return Err(err);
    }

    // Park the effects for the scope's lifetime; disposing the scope is
    // the only thing that stops them.
    scope.on_cleanup(move || {
        drop(resolver);
        drop(lifecycle);
    });

    Ok(QueryResultView::new(result))
}

/// [`create_base_query`] with the plain [`QueryObserver`].
pub fn create_query<T, F>(
    scope: &Scope,
    client: &QueryClient,
    options_fn: F,
) -> Result<QueryResultView<T>>
where
    T: Clone + PartialEq + 'static,
    F: Fn(&QueryClient) -> QueryOptions<T> + 'static,
{
    create_base_query::<T, QueryObserver<T>, F>(scope, client, options_fn)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
