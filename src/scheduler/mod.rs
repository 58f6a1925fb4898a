//! Pluggable execution substrates for logical threads.
//!
//! A [`Scheduler`] decides what a logical thread *is*: an OS thread
//! ([`ThreadScheduler`]), or a cooperatively scheduled stackful coroutine
//! sharing one OS thread ([`FiberScheduler`]). The rest of the crate is
//! substrate-blind — it spawns through the installed scheduler and waits
//! on [`Signal`]s the scheduler manufactured, so blocking receive code
//! works unchanged under either model.
//!
//! Installation is process-wide and scoped: [`run`] installs the scheduler,
//! executes the body as the first logical thread, returns once every
//! logical thread created under it has terminated, and uninstalls. With no
//! scheduler installed, each spawn gets its own detached OS thread.

mod fiber;
mod thread;

pub use fiber::FiberScheduler;
pub use thread::ThreadScheduler;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::sync::Signal;

/// A strategy for creating and interleaving logical threads.
///
/// Implementations must install per-thread state before the spawned
/// operation observes it; the crate arranges this by wrapping every
/// operation in an entry shim before it reaches [`Scheduler::spawn`].
pub trait Scheduler: Send + Sync {
    /// Runs `body` as the first logical thread of this scheduler and
    /// returns only after all logical threads created under it have
    /// terminated.
    fn run(&self, body: Box<dyn FnOnce() + Send>);

    /// Creates a new logical thread executing `op`.
    fn spawn(&self, op: Box<dyn FnOnce() + Send>);

    /// Cooperative hand-off point. A no-op for preemptive schedulers.
    fn yield_now(&self);

    /// Produces a condition-variable analog that suspends correctly when
    /// waited on by this scheduler's logical threads.
    fn new_signal(&self) -> Signal;
}

/// The installed scheduler. Empty outside of [`run`]; sends and spawns
/// then use plain OS threads and condition variables.
static SCHEDULER: RwLock<Option<Arc<dyn Scheduler>>> = RwLock::new(None);

struct Uninstall;

impl Drop for Uninstall {
    fn drop(&mut self) {
        *SCHEDULER.write() = None;
    }
}

/// Installs `scheduler`, runs `body` under it, and blocks until every
/// logical thread spawned under the scheduler has terminated.
///
/// The body is a full logical thread: it gets an identity on first use and
/// its mailbox is torn down (with link/owner notification) when it
/// returns, exactly as for [`spawn`](crate::spawn)ed threads.
///
/// # Panics
///
/// Panics if a scheduler is already installed. Installation must happen
/// before the first spawn; nesting is not supported.
pub fn run<S, F>(scheduler: S, body: F)
where
    S: Scheduler + 'static,
    F: FnOnce() + Send + 'static,
{
    let scheduler: Arc<dyn Scheduler> = Arc::new(scheduler);
    {
        let mut slot = SCHEDULER.write();
        assert!(
            slot.is_none(),
            "a scheduler is already installed; schedulers do not nest"
        );
        *slot = Some(Arc::clone(&scheduler));
    }
    let _uninstall = Uninstall;
    scheduler.run(Box::new(move || crate::process::run_entry(body)));
}

/// Hands `op` to the installed scheduler, or a fresh detached OS thread.
pub(crate) fn spawn_op(op: Box<dyn FnOnce() + Send>) {
    let scheduler = SCHEDULER.read().clone();
    match scheduler {
        Some(s) => s.spawn(op),
        None => {
            std::thread::spawn(op);
        }
    }
}

/// Scheduler-aware cooperative hand-off; no-op without a scheduler.
pub(crate) fn yield_now() {
    let scheduler = SCHEDULER.read().clone();
    if let Some(s) = scheduler {
        s.yield_now();
    }
}

/// Yield used inside signal wait loops: suspends the current fiber when
/// there is one, otherwise degrades to an OS-thread yield so a mixed-mode
/// waiter spins politely instead of hard.
pub(crate) fn cooperative_yield() {
    if fiber::in_fiber() {
        fiber::yield_fiber();
    } else {
        std::thread::yield_now();
    }
}

/// Signal pair (`put`, `not_full`) for a new mailbox, manufactured by the
/// installed scheduler.
pub(crate) fn new_signal_pair() -> (Signal, Signal) {
    let scheduler = SCHEDULER.read().clone();
    match scheduler {
        Some(s) => (s.new_signal(), s.new_signal()),
        None => (Signal::thread(), Signal::thread()),
    }
}

pub(crate) use fiber::active_info;
