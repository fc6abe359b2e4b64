#![forbid(unsafe_code)]

//! Reactive primitives for glint.
//!
//! This crate provides the change-tracking core the query bridge runs on:
//!
//! - [`Observable`]: a shared, version-tracked value wrapper with change
//!   notification via subscriber callbacks.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`Computed`]: a lazily-evaluated, memoized value derived from an
//!   `Observable` dependency.
//! - [`Effect`]: a computation that re-runs whenever any observable it read
//!   during its last run changes.
//! - [`batch`]: collapses multiple synchronous notifications so each
//!   subscriber runs at most once per batch.
//! - [`Scope`]: deterministic teardown registration; cleanups run exactly
//!   once when the scope is disposed.
//!
//! # Architecture
//!
//! `Observable<T>` uses `Rc<RefCell<..>>` for single-threaded shared
//! ownership. Subscribers are stored as `Weak` function pointers and cleaned
//! up lazily during notification.
//!
//! Effects track their dependencies dynamically: every `Observable` read
//! inside the effect body registers that observable as a dependency of the
//! run, and the dependency set is rebuilt on each re-run. [`untrack`]
//! suspends registration for reads that must not become dependencies.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version
//!    bump, no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 5. Within one [`batch`], each subscriber and each effect runs at most
//!    once, observing final values.
//! 6. Scope cleanups run exactly once, in reverse registration order.

pub mod batch;
pub mod computed;
pub mod context;
pub mod effect;
pub mod observable;
pub mod scope;

pub use batch::{batch, is_batching};
pub use computed::Computed;
pub use context::{is_tracking, untrack};
pub use effect::Effect;
pub use observable::{Observable, Subscription};
pub use scope::{Scope, ScopeHandle};
