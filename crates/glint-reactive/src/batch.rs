#![forbid(unsafe_code)]

//! Notification batching.
//!
//! [`batch`] defers observable notifications until the outermost batch
//! exits, collapsing duplicates so each subscriber (and each effect) runs at
//! most once per batch, observing final values. Deferred jobs re-read the
//! source value at flush time, so a subscriber scheduled early in a batch
//! still sees the value as of the flush.
//!
//! # Invariants
//!
//! 1. Outside any batch, notifications run immediately in registration
//!    order.
//! 2. Inside a batch, a dedup key is queued at most once; later schedules
//!    for the same key are dropped (the queued job reads current state when
//!    it runs).
//! 3. Notifications scheduled *during* a flush join the same flush pass.
//! 4. Nested batches flush once, at the exit of the outermost batch.
//!
//! # Failure Modes
//!
//! - **Panic inside the batched closure**: the queue is discarded; pending
//!   notifications for that batch are lost.
//! - **Panic inside a flushed job**: the remaining queue is discarded and
//!   the flushing flag is reset so later batches start clean.

use std::cell::RefCell;
use std::collections::VecDeque;

use ahash::AHashSet;

struct BatchQueue {
    depth: usize,
    flushing: bool,
    keys: AHashSet<u64>,
    jobs: VecDeque<(u64, Box<dyn FnOnce()>)>,
}

thread_local! {
    static QUEUE: RefCell<BatchQueue> = RefCell::new(BatchQueue {
        depth: 0,
        flushing: false,
        keys: AHashSet::new(),
        jobs: VecDeque::new(),
    });
}

/// Whether notifications are currently being deferred (inside a batch or a
/// flush pass).
#[must_use]
pub fn is_batching() -> bool {
    QUEUE.with(|q| {
        let q = q.borrow();
        q.depth > 0 || q.flushing
    })
}

/// Decrements depth on exit and triggers the flush at the outermost level.
struct ExitGuard;

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let should_flush = QUEUE.with(|q| {
            let mut q = q.borrow_mut();
            q.depth -= 1;
            q.depth == 0 && !q.flushing
        });
        if should_flush {
            if std::thread::panicking() {
                QUEUE.with(|q| {
                    let mut q = q.borrow_mut();
                    q.jobs.clear();
                    q.keys.clear();
                });
            } else {
                flush();
            }
        }
    }
}

/// Run `f` with notifications deferred; flush when the outermost batch
/// exits.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    QUEUE.with(|q| q.borrow_mut().depth += 1);
    let _guard = ExitGuard;
    f()
}

/// Resets flush state if a job panics, so the queue does not wedge.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            QUEUE.with(|q| {
                let mut q = q.borrow_mut();
                q.flushing = false;
                q.jobs.clear();
                q.keys.clear();
            });
        }
    }
}

fn flush() {
    QUEUE.with(|q| q.borrow_mut().flushing = true);
    let _guard = FlushGuard;
    loop {
        let job = QUEUE.with(|q| {
            let mut q = q.borrow_mut();
            match q.jobs.pop_front() {
                Some((key, job)) => {
                    q.keys.remove(&key);
                    Some(job)
                }
                None => {
                    q.flushing = false;
                    None
                }
            }
        });
        match job {
            Some(job) => job(),
            None => break,
        }
    }
}

/// Run `job` now, or queue it (deduplicated by `key`) if a batch is active.
pub(crate) fn schedule_or_run(key: u64, job: Box<dyn FnOnce()>) {
    let immediate = QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        if q.depth > 0 || q.flushing {
            if q.keys.insert(key) {
                q.jobs.push_back((key, job));
            }
            None
        } else {
            Some(job)
        }
    });
    if let Some(job) = immediate {
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn immediate_outside_batch() {
        let ran = Rc::new(Cell::new(0u32));
        let ran2 = Rc::clone(&ran);
        schedule_or_run(1, Box::new(move || ran2.set(ran2.get() + 1)));
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn dedup_inside_batch() {
        let ran = Rc::new(Cell::new(0u32));
        batch(|| {
            for _ in 0..5 {
                let ran2 = Rc::clone(&ran);
                schedule_or_run(7, Box::new(move || ran2.set(ran2.get() + 1)));
            }
            assert_eq!(ran.get(), 0);
        });
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn distinct_keys_all_run() {
        let ran = Rc::new(Cell::new(0u32));
        batch(|| {
            for key in 0..4 {
                let ran2 = Rc::clone(&ran);
                schedule_or_run(key, Box::new(move || ran2.set(ran2.get() + 1)));
            }
        });
        assert_eq!(ran.get(), 4);
    }

    #[test]
    fn nested_batches_flush_once() {
        let ran = Rc::new(Cell::new(0u32));
        batch(|| {
            batch(|| {
                let ran2 = Rc::clone(&ran);
                schedule_or_run(3, Box::new(move || ran2.set(ran2.get() + 1)));
            });
            // Inner batch exited, but the outer one is still open.
            assert_eq!(ran.get(), 0);
        });
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn jobs_scheduled_during_flush_join_the_pass() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let order_a = Rc::clone(&order);
        let order_b = Rc::clone(&order);
        batch(|| {
            schedule_or_run(
                10,
                Box::new(move || {
                    order_a.borrow_mut().push("first");
                    let order_c = Rc::clone(&order_b);
                    schedule_or_run(11, Box::new(move || order_c.borrow_mut().push("second")));
                }),
            );
        });
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn same_key_can_requeue_after_running() {
        let ran = Rc::new(Cell::new(0u32));
        let ran_outer = Rc::clone(&ran);
        batch(|| {
            let ran_a = Rc::clone(&ran_outer);
            let requeue = Rc::clone(&ran_outer);
            schedule_or_run(
                20,
                Box::new(move || {
                    ran_a.set(ran_a.get() + 1);
                    // Key 20 already ran and was removed from the dedup set,
                    // so it may queue again within the same flush.
                    let r = Rc::clone(&requeue);
                    schedule_or_run(20, Box::new(move || r.set(r.get() + 1)));
                }),
            );
        });
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn is_batching_reflects_depth() {
        assert!(!is_batching());
        batch(|| {
            assert!(is_batching());
            batch(|| assert!(is_batching()));
            assert!(is_batching());
        });
        assert!(!is_batching());
    }
}
