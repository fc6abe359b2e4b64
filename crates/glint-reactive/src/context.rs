#![forbid(unsafe_code)]

//! Thread-local dependency-tracking context.
//!
//! While an [`Effect`](crate::effect::Effect) body runs, a tracker frame sits
//! on top of a thread-local stack. Every [`Observable`](crate::Observable)
//! read consults the top frame and, on first read of that source in the
//! current run, subscribes the effect's runner to it. [`untrack`] pushes an
//! inert frame so reads register nothing.
//!
//! # Invariants
//!
//! 1. A source read twice in one run subscribes once (dedup by source id).
//! 2. Frames are popped even if the tracked closure panics; the frame's
//!    collected subscriptions are dropped (unsubscribed) in that case.
//! 3. Tracking state is strictly per-thread; the whole reactive system is
//!    single-threaded by construction.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;

use crate::observable::Subscription;

// ─── Id generation ───────────────────────────────────────────────────────────

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique id for observables, subscribers, and effects.
///
/// Ids double as batch dedup keys, so they must never collide across kinds.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Tracker frames ──────────────────────────────────────────────────────────

/// One entry on the tracking stack. `None` marks an [`untrack`] region.
struct TrackerFrame {
    effect_id: u64,
    runner: Rc<dyn Fn()>,
    /// Source ids already subscribed during this run.
    seen: AHashSet<u64>,
    /// Subscriptions collected during this run, handed back to the effect.
    subs: Vec<Subscription>,
}

thread_local! {
    static FRAMES: RefCell<Vec<Option<TrackerFrame>>> = const { RefCell::new(Vec::new()) };
}

/// Pops the top frame when the tracked region exits, including by panic.
struct PopGuard;

impl Drop for PopGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            frames.borrow_mut().pop();
        });
    }
}

/// Run `f` with a live tracker frame for the given effect; returns `f`'s
/// result together with the dependency subscriptions collected during the
/// run.
pub(crate) fn with_tracker<R>(
    effect_id: u64,
    runner: Rc<dyn Fn()>,
    f: impl FnOnce() -> R,
) -> (R, Vec<Subscription>) {
    FRAMES.with(|frames| {
        frames.borrow_mut().push(Some(TrackerFrame {
            effect_id,
            runner,
            seen: AHashSet::new(),
            subs: Vec::new(),
        }));
    });
    let _guard = PopGuard;
    let result = f();
    // Take the collected subscriptions out before the guard pops the frame.
    let subs = FRAMES.with(|frames| match frames.borrow_mut().last_mut() {
        Some(Some(frame)) => std::mem::take(&mut frame.subs),
        _ => Vec::new(),
    });
    (result, subs)
}

/// Run `f` with dependency tracking suspended.
///
/// Observable reads inside `f` register nothing, even when a tracker frame
/// is active further down the stack. Used by the query bridge so
/// engine-side reads never become dependencies of a bridge effect.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    FRAMES.with(|frames| frames.borrow_mut().push(None));
    let _guard = PopGuard;
    f()
}

/// Whether a tracker frame is currently collecting dependencies.
#[must_use]
pub fn is_tracking() -> bool {
    FRAMES.with(|frames| matches!(frames.borrow().last(), Some(Some(_))))
}

/// Register a read of `source_id` with the active tracker, if any.
///
/// `subscribe` is invoked at most once per (run, source) pair with the
/// effect's runner and its batch dedup key; the returned subscription is
/// stored in the frame and handed to the effect when the run completes.
pub(crate) fn register_read(
    source_id: u64,
    subscribe: &dyn Fn(Rc<dyn Fn()>, u64) -> Subscription,
) {
    let pending = FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        match frames.last_mut() {
            Some(Some(frame)) => {
                if frame.seen.insert(source_id) {
                    Some((frame.runner.clone(), frame.effect_id))
                } else {
                    None
                }
            }
            _ => None,
        }
    });
    // Subscribe with the thread-local borrow released: the observable
    // mutates its own subscriber list here.
    if let Some((runner, effect_id)) = pending {
        let sub = subscribe(runner, effect_id);
        FRAMES.with(|frames| {
            if let Some(Some(frame)) = frames.borrow_mut().last_mut() {
                frame.subs.push(sub);
            }
        });
    }
}
