//! Cooperative coroutine scheduler: many logical threads, one OS thread.
//!
//! Logical threads are stackful coroutines (the `generator` crate), so
//! receive can block anywhere in handler code; suspension simply switches
//! stacks back to the dispatch loop. Coroutines are not `Send` and never
//! migrate: spawn requests are `Send` closures queued on an injector, and
//! the dispatch thread turns them into coroutines locally.
//!
//! Each fiber carries its own per-thread state, published to the rest of
//! the crate through a thread-local slot for the duration of each resume.
//! Waiting under this scheduler uses [`Signal::fiber`] flags polled in a
//! yield loop, with the waiter's mutex released around every yield.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use generator::Gn;
use parking_lot::Mutex;

use crate::process::ThreadInfo;
use crate::scheduler::Scheduler;
use crate::sync::Signal;
use crate::tracing_compat::trace;

/// Stack allocation size for each fiber. Handler code runs on this stack.
const FIBER_STACK_SIZE: usize = 0x1_0000;

type Fiber = generator::Generator<'static, (), ()>;

thread_local! {
    /// Per-thread state of the fiber currently being resumed, if any.
    static ACTIVE: RefCell<Option<Rc<RefCell<ThreadInfo>>>> = const { RefCell::new(None) };
}

/// The per-thread state of the running fiber, when the caller is one.
pub(crate) fn active_info() -> Option<Rc<RefCell<ThreadInfo>>> {
    ACTIVE.with(|cell| cell.borrow().clone())
}

pub(crate) fn in_fiber() -> bool {
    ACTIVE.with(|cell| cell.borrow().is_some())
}

/// Suspends the running fiber back to its dispatch loop.
///
/// Callers must hold no lock that another logical thread could need.
pub(crate) fn yield_fiber() {
    generator::yield_with(());
}

/// The cooperative reference scheduler.
///
/// `run` enters the dispatch loop on the calling OS thread and round-robins
/// over live fibers until none remain. Spawns from other OS threads are
/// accepted too; they are admitted at the next dispatch iteration.
#[derive(Default)]
pub struct FiberScheduler {
    injector: Mutex<VecDeque<Box<dyn FnOnce() + Send>>>,
}

impl std::fmt::Debug for FiberScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberScheduler")
            .field("pending_spawns", &self.injector.lock().len())
            .finish()
    }
}

/// A live fiber paired with the state `active_info` exposes while the
/// fiber runs.
struct Slot {
    fiber: Fiber,
    info: Rc<RefCell<ThreadInfo>>,
}

impl FiberScheduler {
    /// Creates a new cooperative scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn admit(&self, fibers: &mut Vec<Slot>) {
        let pending: Vec<_> = self.injector.lock().drain(..).collect();
        for op in pending {
            let info = Rc::new(RefCell::new(ThreadInfo::new()));
            #[allow(deprecated)]
            let fiber = Gn::new_opt(FIBER_STACK_SIZE, move || {
                op();
            });
            fibers.push(Slot { fiber, info });
        }
    }

    fn dispatch(&self) {
        let mut fibers: Vec<Slot> = Vec::new();
        let mut pos = 0_usize;
        loop {
            self.admit(&mut fibers);
            if fibers.is_empty() {
                return;
            }
            if pos >= fibers.len() {
                pos = 0;
            }

            {
                let slot = &mut fibers[pos];
                let prev = ACTIVE.with(|cell| cell.replace(Some(Rc::clone(&slot.info))));
                slot.fiber.resume();
                ACTIVE.with(|cell| *cell.borrow_mut() = prev);
            }

            // Admit spawns made during this resume before advancing, so a
            // freshly spawned fiber is next in line after its spawner
            // yields.
            self.admit(&mut fibers);

            if fibers[pos].fiber.is_done() {
                fibers.remove(pos);
                trace!(live = fibers.len(), "fiber terminated");
                if pos >= fibers.len() {
                    pos = 0;
                }
            } else {
                pos = (pos + 1) % fibers.len();
            }
        }
    }
}

impl Scheduler for FiberScheduler {
    fn run(&self, body: Box<dyn FnOnce() + Send>) {
        self.injector.lock().push_back(body);
        self.dispatch();
    }

    fn spawn(&self, op: Box<dyn FnOnce() + Send>) {
        self.injector.lock().push_back(op);
        // Hand the new thread a chance to start before the spawner runs on.
        self.yield_now();
    }

    fn yield_now(&self) {
        if in_fiber() {
            yield_fiber();
        }
    }

    fn new_signal(&self) -> Signal {
        Signal::fiber()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_every_fiber_to_completion() {
        let done = Arc::new(AtomicUsize::new(0));
        let scheduler = Arc::new(FiberScheduler::new());
        for _ in 0..3 {
            let done = Arc::clone(&done);
            scheduler.injector.lock().push_back(Box::new(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        scheduler.run(Box::new(|| {}));
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn fibers_interleave_at_yield_points() {
        // Two fibers ping-pong via yields; both must make progress on one
        // OS thread.
        let trace_log = Arc::new(Mutex::new(Vec::new()));
        let scheduler = Arc::new(FiberScheduler::new());
        for name in ["a", "b"] {
            let trace_log = Arc::clone(&trace_log);
            scheduler.injector.lock().push_back(Box::new(move || {
                for round in 0..3 {
                    trace_log.lock().push(format!("{name}{round}"));
                    yield_fiber();
                }
            }));
        }
        scheduler.run(Box::new(|| {}));

        let log = trace_log.lock();
        // Strict round-robin alternation.
        assert_eq!(*log, ["a0", "b0", "a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn spawner_yields_so_child_starts_promptly() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let scheduler = Arc::new(FiberScheduler::new());
        {
            let order = Arc::clone(&order);
            let inner = Arc::clone(&scheduler);
            scheduler.injector.lock().push_back(Box::new(move || {
                let order2 = Arc::clone(&order);
                inner.spawn(Box::new(move || order2.lock().push("child")));
                order.lock().push("parent-after-spawn");
            }));
        }
        scheduler.run(Box::new(|| {}));
        assert_eq!(*order.lock(), ["child", "parent-after-spawn"]);
    }
}
