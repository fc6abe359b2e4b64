#![forbid(unsafe_code)]

//! Shared, version-tracked value cells with change notification.
//!
//! # Design
//!
//! [`Observable<T>`] wraps a value in shared, reference-counted storage.
//! Cloning an `Observable` creates a new handle to the **same** cell.
//! Subscribers are stored as `Weak` function pointers and cleaned up lazily
//! during notification; a live [`Subscription`] guard keeps its callback
//! alive and removes it on drop.
//!
//! Reads made while an [`Effect`](crate::Effect) is running register the
//! cell as a dependency of that effect. Writes notify subscribers in
//! registration order — immediately outside a [`batch`](crate::batch), or
//! once per subscriber at flush time inside one.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version
//!    bump, no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 5. Notification runs with the value borrow released; callbacks may read
//!    and write any observable, including this one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::{batch, context};

// ─── Subscription ────────────────────────────────────────────────────────────

/// RAII guard for a registered callback; unsubscribes on drop.
///
/// The guard owns the callback: once it is dropped, the callback is removed
/// and will not run in any later notification cycle.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap a cancellation action. The action runs exactly once, when the
    /// guard is dropped (or [`unsubscribe`](Self::unsubscribe) is called).
    #[must_use]
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Explicitly cancel. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ─── Observable ──────────────────────────────────────────────────────────────

struct SubscriberEntry<T> {
    /// Removal handle, unique per registration.
    key: u64,
    /// Batch dedup key: equals `key` for plain subscribers, the effect id
    /// for effect runners (so one effect collapses across sources).
    dedup: u64,
    callback: Weak<dyn Fn(&T)>,
}

struct ObservableInner<T> {
    id: u64,
    value: RefCell<T>,
    version: Cell<u64>,
    subscribers: RefCell<Vec<SubscriberEntry<T>>>,
}

/// A shared, version-tracked value cell.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Create a new cell holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                id: context::next_id(),
                value: RefCell::new(value),
                version: Cell::new(0),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Stable identity of the cell (shared by all clones of this handle).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of value-changing mutations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Get a clone of the current value. Registers a dependency when called
    /// inside a running effect.
    #[must_use]
    pub fn get(&self) -> T {
        self.track_read();
        self.inner.value.borrow().clone()
    }

    /// Access the current value by reference without cloning. Registers a
    /// dependency when called inside a running effect.
    ///
    /// # Panics
    ///
    /// Panics if the closure writes this same observable (re-entrant
    /// borrow).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track_read();
        f(&self.inner.value.borrow())
    }

    /// Set a new value. Equal values are a no-op; otherwise the version is
    /// bumped and subscribers are notified.
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        let changed = {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        };
        if changed {
            self.inner.version.set(self.inner.version.get() + 1);
            self.notify();
        }
    }

    /// Register a callback invoked with the new value after every change.
    #[must_use]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let callback: Rc<dyn Fn(&T)> = Rc::new(callback);
        let key = context::next_id();
        self.register(key, key, &callback)
    }

    /// Subscribe an effect runner. `dedup` is the effect id, shared across
    /// all of the effect's sources so one batch runs the effect once.
    pub(crate) fn subscribe_runner(&self, runner: Rc<dyn Fn()>, dedup: u64) -> Subscription {
        let callback: Rc<dyn Fn(&T)> = Rc::new(move |_| runner());
        let key = context::next_id();
        self.register(key, dedup, &callback)
    }

    fn register(&self, key: u64, dedup: u64, callback: &Rc<dyn Fn(&T)>) -> Subscription {
        self.inner.subscribers.borrow_mut().push(SubscriberEntry {
            key,
            dedup,
            callback: Rc::downgrade(callback),
        });
        let weak_inner = Rc::downgrade(&self.inner);
        let keep_alive = Rc::clone(callback);
        Subscription::new(move || {
            if let Some(inner) = weak_inner.upgrade() {
                inner.subscribers.borrow_mut().retain(|entry| entry.key != key);
            }
            drop(keep_alive);
        })
    }

    fn track_read(&self) {
        if context::is_tracking() {
            context::register_read(self.inner.id, &|runner, dedup| {
                self.subscribe_runner(runner, dedup)
            });
        }
    }

    fn notify(&self) {
        // Snapshot live subscribers (pruning dead entries) so callbacks may
        // freely mutate the subscriber list.
        let live: Vec<(u64, Weak<dyn Fn(&T)>)> = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            subscribers.retain(|entry| entry.callback.strong_count() > 0);
            subscribers
                .iter()
                .map(|entry| (entry.dedup, entry.callback.clone()))
                .collect()
        };
        for (dedup, weak_callback) in live {
            let inner = Rc::clone(&self.inner);
            batch::schedule_or_run(
                dedup,
                Box::new(move || {
                    // Liveness is re-checked at run time: a subscription
                    // dropped between scheduling and flush must not fire.
                    if let Some(callback) = weak_callback.upgrade() {
                        let snapshot = inner.value.borrow().clone();
                        callback(&snapshot);
                    }
                }),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
