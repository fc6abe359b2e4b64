#![forbid(unsafe_code)]

//! Lazy computed values that auto-update from [`Observable`] dependencies.
//!
//! # Design
//!
//! [`Computed<T>`] wraps a compute function and its cached result in shared,
//! reference-counted storage. [`from_observable`](Computed::from_observable)
//! tracks staleness by comparing the source cell's version against the
//! version seen at the last computation, so a read is never stale even when
//! the source changed inside a still-open batch. The next call to
//! [`get()`](Computed::get) recomputes and caches the result.
//!
//! # Invariants
//!
//! 1. `get()` always returns a value consistent with the current state of
//!    the source (no stale reads after a source mutation, batched or not).
//! 2. The compute function is called at most once per source change cycle
//!    (memoization).
//! 3. If the source has not changed, `get()` returns the cached value in
//!    O(1).
//! 4. Version increments by exactly 1 per recomputation **that changes the
//!    value**: a recompute yielding an equal value leaves the version
//!    untouched. The version counts distinct observed values.
//!
//! # Failure Modes
//!
//! - **Compute function panics**: the cached value remains from the last
//!   successful computation; the next `get()` retries.
//! - **Manual wiring** ([`from_fn`](Computed::from_fn)): staleness is the
//!   caller's problem — the cached value is recomputed only after
//!   [`invalidate`](Computed::invalidate).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::observable::{Observable, Subscription};

/// Shared interior for [`Computed<T>`].
struct ComputedInner<T> {
    /// The computation function.
    compute: Box<dyn Fn() -> T>,
    /// Returns the source's current version, when version-tracked.
    source_version: Option<Box<dyn Fn() -> u64>>,
    /// Source version observed at the last computation.
    seen_version: Cell<u64>,
    /// Cached result (None only before first computation).
    cached: Option<T>,
    /// Manual invalidation flag (always honored; the only staleness signal
    /// for `from_fn` values).
    dirty: Cell<bool>,
    /// Bumped on each recomputation that produced a different value.
    version: u64,
    /// Subscription guards keeping manually-wired callbacks alive.
    _subscriptions: Vec<Subscription>,
}

/// A lazily-evaluated, memoized value derived from an [`Observable`]
/// dependency.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
pub struct Computed<T> {
    inner: Rc<RefCell<ComputedInner<T>>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Computed")
            .field("cached", &inner.cached)
            .field("dirty", &inner.dirty.get())
            .field("version", &inner.version)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    /// Create a computed value derived from a single observable.
    ///
    /// The `map` function receives a reference to the source value and
    /// returns the derived value.
    pub fn from_observable<S: Clone + 'static>(
        source: &Observable<S>,
        map: impl Fn(&S) -> T + 'static,
    ) -> Self {
        let compute_source = source.clone();
        let compute = Box::new(move || compute_source.with(|v| map(v)));
        let version_source = source.clone();
        let source_version = Box::new(move || version_source.version());

        Self {
            inner: Rc::new(RefCell::new(ComputedInner {
                compute,
                source_version: Some(source_version),
                seen_version: Cell::new(0),
                cached: None,
                dirty: Cell::new(true), // Dirty initially — computes on first get().
                version: 0,
                _subscriptions: Vec::new(),
            })),
        }
    }

    /// Create a computed value from a standalone compute function and
    /// pre-built subscriptions.
    ///
    /// This is the low-level constructor for advanced use cases where the
    /// caller manages dependency subscriptions and invalidation manually.
    pub fn from_fn(compute: impl Fn() -> T + 'static, subscriptions: Vec<Subscription>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ComputedInner {
                compute: Box::new(compute),
                source_version: None,
                seen_version: Cell::new(0),
                cached: None,
                dirty: Cell::new(true),
                version: 0,
                _subscriptions: subscriptions,
            })),
        }
    }

    /// Get the current value, recomputing if the source has changed.
    ///
    /// Returns a clone of the cached value.
    #[must_use]
    pub fn get(&self) -> T {
        self.refresh();
        self.inner
            .borrow()
            .cached
            .as_ref()
            .expect("cached is always Some after refresh")
            .clone()
    }

    /// Access the current value by reference without cloning.
    ///
    /// Forces recomputation if stale. The closure receives an immutable
    /// reference to the cached value.
    ///
    /// # Panics
    ///
    /// Panics if the closure calls `get()` on the same `Computed`
    /// (re-entrant borrow).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.refresh();
        let inner = self.inner.borrow();
        f(inner
            .cached
            .as_ref()
            .expect("cached is always Some after refresh"))
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        let inner = self.inner.borrow();
        inner.dirty.get() || inner.cached.is_none() || Self::source_moved(&inner)
    }

    /// Force invalidation of the cached value. The next `get()` will
    /// recompute.
    pub fn invalidate(&self) {
        self.inner.borrow().dirty.set(true);
    }

    /// Current version number. Increments by 1 each time a recomputation
    /// observes a different value.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    fn source_moved(inner: &ComputedInner<T>) -> bool {
        inner
            .source_version
            .as_ref()
            .is_some_and(|sv| sv() != inner.seen_version.get())
    }

    fn refresh(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.dirty.get() || inner.cached.is_none() || Self::source_moved(&inner) {
            let new_value = (inner.compute)();
            if let Some(sv) = inner.source_version.as_ref() {
                inner.seen_version.set(sv());
            }
            inner.dirty.set(false);
            if inner.cached.as_ref() != Some(&new_value) {
                inner.cached = Some(new_value);
                inner.version += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
