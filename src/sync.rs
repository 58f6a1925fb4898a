//! Condition-variable analogs that suspend correctly under either
//! execution substrate.
//!
//! A [`Signal`] is created by the scheduler that owns the waiting side
//! (see [`Scheduler::new_signal`](crate::scheduler::Scheduler::new_signal)):
//!
//! - The thread variant wraps a real condition variable.
//! - The fiber variant is a notification flag polled in a cooperative
//!   yield loop. A fiber that held the mailbox mutex across a yield could
//!   never be woken by a peer needing that mutex, so the guard is released
//!   around the entire wait and re-acquired before returning — the
//!   user-visible contract matches the condvar exactly, including spurious
//!   wakeups (callers re-check their predicate in a loop).
//!
//! Wakeup bookkeeping for the fiber variant follows the token/generation
//! split: `notify_one` banks a token consumed by a single waiter,
//! `notify_all` bumps a generation observed by every current waiter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, MutexGuard};

/// A scheduler-aware condition-variable analog.
#[derive(Debug)]
pub struct Signal {
    kind: SignalKind,
}

#[derive(Debug)]
enum SignalKind {
    Thread(Condvar),
    Fiber(FiberSignal),
}

#[derive(Debug, Default)]
struct FiberSignal {
    /// Banked single-waiter notifications.
    tokens: AtomicUsize,
    /// Bumped by `notify_all`; waiters wake when it moves.
    generation: AtomicUsize,
}

impl Signal {
    /// A signal backed by an OS condition variable.
    #[must_use]
    pub fn thread() -> Self {
        Self {
            kind: SignalKind::Thread(Condvar::new()),
        }
    }

    /// A signal backed by a cooperative yield loop.
    #[must_use]
    pub fn fiber() -> Self {
        Self {
            kind: SignalKind::Fiber(FiberSignal::default()),
        }
    }

    /// Blocks until notified. Spurious wakeups are permitted.
    pub(crate) fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
        match &self.kind {
            SignalKind::Thread(cv) => cv.wait(guard),
            SignalKind::Fiber(fs) => {
                let entered_at = fs.generation.load(Ordering::Acquire);
                MutexGuard::unlocked(guard, || {
                    while !fs.consume(entered_at) {
                        crate::scheduler::cooperative_yield();
                    }
                });
            }
        }
    }

    /// Blocks until notified or the timeout elapses.
    ///
    /// Returns false iff the wait timed out without a notification.
    pub(crate) fn wait_for<T>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> bool {
        match &self.kind {
            SignalKind::Thread(cv) => !cv.wait_for(guard, timeout).timed_out(),
            SignalKind::Fiber(fs) => {
                let entered_at = fs.generation.load(Ordering::Acquire);
                let deadline = Instant::now() + timeout;
                MutexGuard::unlocked(guard, || loop {
                    if fs.consume(entered_at) {
                        return true;
                    }
                    if Instant::now() >= deadline {
                        return false;
                    }
                    crate::scheduler::cooperative_yield();
                })
            }
        }
    }

    /// Wakes one waiter (or banks the notification).
    pub(crate) fn notify_one(&self) {
        match &self.kind {
            SignalKind::Thread(cv) => {
                cv.notify_one();
            }
            SignalKind::Fiber(fs) => {
                fs.tokens.fetch_add(1, Ordering::Release);
            }
        }
    }

    /// Wakes every current waiter.
    pub(crate) fn notify_all(&self) {
        match &self.kind {
            SignalKind::Thread(cv) => {
                cv.notify_all();
            }
            SignalKind::Fiber(fs) => {
                fs.generation.fetch_add(1, Ordering::Release);
            }
        }
    }
}

impl FiberSignal {
    /// Returns true once a wakeup addressed to this waiter is observed.
    fn consume(&self, entry_generation: usize) -> bool {
        if self.generation.load(Ordering::Acquire) != entry_generation {
            return true;
        }
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| t.checked_sub(1))
            .is_ok()
    }
}
