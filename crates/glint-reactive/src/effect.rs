#![forbid(unsafe_code)]

//! Reactive computations with auto-tracked dependencies.
//!
//! # Design
//!
//! [`Effect::new`] runs its body once immediately. Every [`Observable`]
//! read during the run registers that cell as a dependency; when any
//! dependency changes, the body re-runs and the dependency set is rebuilt
//! from that run's reads (dynamic dependencies — a branch not taken this
//! run contributes no subscriptions).
//!
//! Effect bodies may write observables. Writes back into a cell the body
//! itself reads would loop; the re-entrancy guard below turns that into a
//! single deferred re-run per change instead of unbounded recursion, but
//! such cycles remain a caller bug.
//!
//! # Invariants
//!
//! 1. The body runs exactly once at construction.
//! 2. A dependency read N times in one run subscribes once.
//! 3. Within one [`batch`](crate::batch), the body re-runs at most once no
//!    matter how many dependencies changed.
//! 4. A notification arriving while the body is on the stack does not
//!    re-enter it; the body re-runs once after the current run completes.
//! 5. Dropping the [`Effect`] guard severs all subscriptions; the body
//!    never runs again.
//!
//! # Failure Modes
//!
//! - **Body panics**: the panic propagates to whatever write triggered the
//!   run. The effect is left inert (no dependency subscriptions); it will
//!   not run again.
//!
//! [`Observable`]: crate::Observable

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use crate::context;
use crate::observable::Subscription;

struct EffectInner {
    id: u64,
    body: RefCell<Box<dyn FnMut()>>,
    /// Dependency subscriptions from the most recent run.
    deps: RefCell<Vec<Subscription>>,
    running: Cell<bool>,
    /// Set when a notification lands mid-run; forces one follow-up run.
    stale: Cell<bool>,
}

/// RAII guard for a running reactive computation. Dropping it stops all
/// future re-runs.
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create the effect and run `body` once immediately, tracking its
    /// dependencies.
    #[must_use]
    pub fn new(body: impl FnMut() + 'static) -> Self {
        let inner = Rc::new(EffectInner {
            id: context::next_id(),
            body: RefCell::new(Box::new(body)),
            deps: RefCell::new(Vec::new()),
            running: Cell::new(false),
            stale: Cell::new(false),
        });
        Self::run(&inner);
        Self { inner }
    }

    /// Stable identity of the effect (its batch dedup key).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    fn run(inner: &Rc<EffectInner>) {
        if inner.running.get() {
            inner.stale.set(true);
            return;
        }
        inner.running.set(true);
        loop {
            // Old subscriptions are dropped (unsubscribed) before the run
            // so the dependency set reflects only this run's reads.
            inner.deps.borrow_mut().clear();

            let weak = Rc::downgrade(inner);
            let runner: Rc<dyn Fn()> = Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Effect::run(&inner);
                }
            });

            trace!(effect_id = inner.id, "effect run");
            let ((), subs) = context::with_tracker(inner.id, runner, || {
                let mut body = inner.body.borrow_mut();
                (&mut **body)();
            });
            *inner.deps.borrow_mut() = subs;

            if !inner.stale.replace(false) {
                break;
            }
        }
        inner.running.set(false);
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        // The runner Rcs held by live subscriptions only hold a Weak back
        // to the inner state, so clearing the subscriptions here is enough
        // to guarantee the body never runs again.
        self.inner.deps.borrow_mut().clear();
        self.inner.stale.set(false);
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("running", &self.inner.running.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
