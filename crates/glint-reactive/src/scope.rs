#![forbid(unsafe_code)]

//! Scope-based teardown registration.
//!
//! A [`Scope`] is the ownership boundary for reactive resources: effects,
//! subscriptions, and anything else that must be released when the owning
//! UI region goes away. Cleanups registered with
//! [`on_cleanup`](Scope::on_cleanup) run exactly once, in reverse
//! registration order, at the first [`dispose`](Scope::dispose); dropping
//! the `Scope` disposes it.
//!
//! [`ScopeHandle`] is a clonable reference for registering cleanups from
//! inside callbacks; unlike `Scope`, dropping a handle disposes nothing.
//!
//! # Invariants
//!
//! 1. Cleanups run exactly once; `dispose` is idempotent.
//! 2. Cleanups run in reverse registration order.
//! 3. Registering a cleanup on an already-disposed scope runs it
//!    immediately.
//! 4. Disposing a parent disposes its children (created via
//!    [`child`](Scope::child)).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

struct ScopeInner {
    disposed: Cell<bool>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl ScopeInner {
    fn on_cleanup(self: &Rc<Self>, f: impl FnOnce() + 'static) {
        if self.disposed.get() {
            f();
        } else {
            self.cleanups.borrow_mut().push(Box::new(f));
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        debug!("scope disposed");
        // Disposed is already set: cleanups registered from inside a
        // cleanup run immediately rather than landing in the drained list.
        loop {
            let next = self.cleanups.borrow_mut().pop();
            match next {
                Some(cleanup) => cleanup(),
                None => break,
            }
        }
    }
}

/// Owner of a teardown boundary. Dropping it disposes the scope.
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    /// Create a root scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                disposed: Cell::new(false),
                cleanups: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create a child scope disposed together with this one (or earlier,
    /// on its own).
    #[must_use]
    pub fn child(&self) -> Scope {
        let child = Scope::new();
        let child_inner = Rc::clone(&child.inner);
        self.inner.on_cleanup(move || child_inner.dispose());
        child
    }

    /// Register a callback to run when the scope is disposed. On an
    /// already-disposed scope the callback runs immediately.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        self.inner.on_cleanup(f);
    }

    /// Run all cleanups now. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether the scope has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// A clonable registration handle. Dropping the handle does not
    /// dispose the scope.
    #[must_use]
    pub fn handle(&self) -> ScopeHandle {
        ScopeHandle {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

/// Clonable registration handle for a [`Scope`].
#[derive(Clone)]
pub struct ScopeHandle {
    inner: Rc<ScopeInner>,
}

impl ScopeHandle {
    /// Same contract as [`Scope::on_cleanup`].
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        self.inner.on_cleanup(f);
    }

    /// Whether the underlying scope has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl std::fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
