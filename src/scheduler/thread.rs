//! Kernel-thread scheduler: one OS thread per spawn.

use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::scheduler::Scheduler;
use crate::sync::Signal;
use crate::tracing_compat::trace;

/// The preemptive reference scheduler. Every spawn gets a dedicated OS
/// thread; waiting uses real condition variables.
///
/// Unlike the default (scheduler-less) mode, spawned threads are tracked
/// and joined when [`run`](crate::run) returns, so the caller gets the
/// "everything has terminated" guarantee of the scheduler contract.
#[derive(Debug, Default)]
pub struct ThreadScheduler {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadScheduler {
    /// Creates a new kernel-thread scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn join_all(&self) {
        // Threads may spawn more threads while we join; drain until the
        // list stays empty. The lock is released around each join.
        loop {
            let Some(handle) = self.handles.lock().pop() else {
                return;
            };
            let _ = handle.join();
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn run(&self, body: Box<dyn FnOnce() + Send>) {
        body();
        self.join_all();
    }

    fn spawn(&self, op: Box<dyn FnOnce() + Send>) {
        let handle = std::thread::spawn(op);
        trace!(thread = ?handle.thread().id(), "spawned kernel thread");
        self.handles.lock().push(handle);
    }

    fn yield_now(&self) {
        // Preemptive scheduling: hand-off points are everywhere already.
    }

    fn new_signal(&self) -> Signal {
        Signal::thread()
    }
}
