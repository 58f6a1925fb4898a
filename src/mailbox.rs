//! Per-thread dual-lane mailboxes.
//!
//! Each logical thread owns exactly one mailbox with two lanes per side:
//!
//! - The **shared** side (`std` + `priority` lanes) is where producers
//!   enqueue, under one mutex.
//! - The **local** side is the receiver's private buffer, drained from the
//!   shared side in batches so that repeated receive scans do not fight
//!   producers for the lock.
//!
//! Bounded mailboxes apply an [`OnCrowding`] policy to standard messages
//! only; priority and control messages always get through. The crowding
//! check charges producers for messages the receiver has buffered locally
//! via `local_msgs`, a count snapshot the receiver refreshes on each drain,
//! so producers never touch the local lanes.
//!
//! Lanes are `VecDeque`s: append is O(1), batch hand-off is a pointer
//! splice, and the receive scan removes by cursor position.

use core::fmt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, ErrorKind, Result};
use crate::message::{Message, MessageKind};
use crate::sync::Signal;
use crate::tid::Tid;
use crate::tracing_compat::trace;

static NEXT_MAILBOX_ID: AtomicU64 = AtomicU64::new(1);

/// Policy applied when a standard message meets a full mailbox.
///
/// Only standard messages are subject to crowding; priority and control
/// messages bypass the bound entirely.
#[derive(Clone)]
pub enum OnCrowding {
    /// Block the sender until the receiver makes room.
    Block,
    /// Fail the send with [`ErrorKind::MailboxFull`].
    Fail,
    /// Silently discard the message. Waiting senders are not woken: no
    /// slot opened.
    Drop,
    /// Ask a predicate, called with the crowded mailbox's handle and with
    /// no mailbox lock held: `true` means block, `false` means drop.
    Custom(Arc<dyn Fn(&Tid) -> bool + Send + Sync>),
}

impl fmt::Debug for OnCrowding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block => f.write_str("Block"),
            Self::Fail => f.write_str("Fail"),
            Self::Drop => f.write_str("Drop"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Verdict of one dispatch attempt against one message.
pub(crate) enum DispatchOutcome {
    /// The message was accepted and consumed.
    Consumed,
    /// No handler accepted it; the message is handed back intact.
    Rejected(Message),
    /// Dispatch must abort the receive with an error. The message is
    /// consumed (a priority or control message that nothing accepted).
    Failed(Error),
}

/// Producer-visible queue state, guarded by the mailbox mutex.
#[derive(Debug)]
struct Shared {
    std_lane: VecDeque<Message>,
    pty_lane: VecDeque<Message>,
    /// Receiver's buffered standard count, snapshotted at each drain.
    local_msgs: usize,
    /// Producers currently blocked on `not_full`.
    put_queue: usize,
    closed: bool,
    /// 0 = unbounded.
    max_msgs: usize,
    on_crowding: OnCrowding,
}

impl Shared {
    /// Crowding check: counts undrained standard messages plus the
    /// receiver's cached local count.
    fn is_crowded(&self) -> bool {
        self.max_msgs != 0 && self.local_msgs + self.std_lane.len() >= self.max_msgs
    }
}

/// Receiver-private buffers. Only the owning thread touches these; the
/// mutex is uncontended and exists to keep the type `Sync` without
/// unsafe code.
#[derive(Debug, Default)]
struct Local {
    std_lane: VecDeque<Message>,
    pty_lane: VecDeque<Message>,
}

/// A per-thread message store with standard and priority lanes.
#[derive(Debug)]
pub(crate) struct Mailbox {
    id: u64,
    shared: Mutex<Shared>,
    local: Mutex<Local>,
    /// Signaled on every successful enqueue.
    put_signal: Signal,
    /// Signaled (broadcast) when a crowded mailbox gains room.
    not_full: Signal,
}

impl Mailbox {
    pub(crate) fn new(put_signal: Signal, not_full: Signal) -> Self {
        Self {
            id: NEXT_MAILBOX_ID.fetch_add(1, Ordering::Relaxed),
            shared: Mutex::new(Shared {
                std_lane: VecDeque::new(),
                pty_lane: VecDeque::new(),
                local_msgs: 0,
                put_queue: 0,
                closed: false,
                max_msgs: 0,
                on_crowding: OnCrowding::Block,
            }),
            local: Mutex::new(Local::default()),
            put_signal,
            not_full,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Number of messages enqueued on the shared side and not yet drained.
    ///
    /// A producer-side snapshot; the receiver may hold more locally.
    pub(crate) fn queued_len(&self) -> usize {
        let shared = self.shared.lock();
        shared.std_lane.len() + shared.pty_lane.len()
    }

    /// Updates the capacity bound and crowding policy.
    pub(crate) fn set_max(&self, max_msgs: usize, on_crowding: OnCrowding) {
        let mut shared = self.shared.lock();
        shared.max_msgs = max_msgs;
        shared.on_crowding = on_crowding;
    }

    /// Enqueues a message.
    ///
    /// Priority and control messages always land. Standard messages run
    /// the crowding check and fall back to the configured policy.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::MailboxClosed`] if the mailbox is closed (the message
    /// is discarded), [`ErrorKind::MailboxFull`] under the `Fail` policy.
    pub(crate) fn put(&self, msg: Message, target: &Tid) -> Result<()> {
        let mut shared = self.shared.lock();
        loop {
            if shared.closed {
                return Err(Error::new(ErrorKind::MailboxClosed).with_tid(target.clone()));
            }
            if matches!(msg.kind, MessageKind::Priority) {
                shared.pty_lane.push_back(msg);
                self.put_signal.notify_one();
                return Ok(());
            }
            if msg.is_control() || !shared.is_crowded() {
                shared.std_lane.push_back(msg);
                self.put_signal.notify_one();
                return Ok(());
            }
            match shared.on_crowding.clone() {
                OnCrowding::Fail => {
                    return Err(Error::new(ErrorKind::MailboxFull).with_tid(target.clone()));
                }
                OnCrowding::Drop => return Ok(()),
                OnCrowding::Block => self.block_until_room(&mut shared),
                OnCrowding::Custom(decide) => {
                    let block = MutexGuard::unlocked(&mut shared, || decide(target));
                    if !block {
                        return Ok(());
                    }
                    // The decision was made unlocked; the loop re-checks
                    // crowding (and closure) after the wait.
                    if shared.is_crowded() && !shared.closed {
                        self.block_until_room(&mut shared);
                    }
                }
            }
        }
    }

    fn block_until_room(&self, shared: &mut MutexGuard<'_, Shared>) {
        shared.put_queue += 1;
        self.not_full.wait(shared);
        shared.put_queue -= 1;
    }

    /// Receives one message accepted by `dispatch`.
    ///
    /// Returns `Ok(true)` once a message is consumed, `Ok(false)` when the
    /// timeout expires first. Dispatch runs with no mailbox lock held.
    ///
    /// # Errors
    ///
    /// Propagates [`DispatchOutcome::Failed`], and reports owner
    /// termination when the mailbox itself is closed and drained.
    pub(crate) fn get(
        &self,
        dispatch: &mut dyn FnMut(Message) -> DispatchOutcome,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.scan_local(Lane::Priority, dispatch)? {
                return Ok(true);
            }
            if self.scan_local(Lane::Standard, dispatch)? {
                return Ok(true);
            }

            // Cooperative nudge so a busy receiver cannot starve peers.
            crate::scheduler::yield_now();

            let local_std_len = self.local.lock().std_lane.len();
            let mut shared = self.shared.lock();
            shared.local_msgs = local_std_len;
            while shared.std_lane.is_empty() && shared.pty_lane.is_empty() {
                if shared.closed {
                    return Err(Error::owner_terminated(None));
                }
                if shared.put_queue > 0 && !shared.is_crowded() {
                    self.not_full.notify_all();
                }
                match deadline {
                    None => self.put_signal.wait(&mut shared),
                    Some(at) => {
                        let remaining = at.saturating_duration_since(Instant::now());
                        if remaining.is_zero()
                            || !self.put_signal.wait_for(&mut shared, remaining)
                        {
                            return Ok(false);
                        }
                    }
                }
            }
            let mut arrived = std::mem::take(&mut shared.std_lane);
            let mut arrived_pty = std::mem::take(&mut shared.pty_lane);
            drop(shared);

            if !arrived_pty.is_empty() {
                // Priority first: park the standard batch and loop back to
                // the lane scans.
                let mut local = self.local.lock();
                local.pty_lane.append(&mut arrived_pty);
                local.std_lane.append(&mut arrived);
                continue;
            }

            while let Some(msg) = arrived.pop_front() {
                match dispatch(msg) {
                    DispatchOutcome::Consumed => {
                        self.local.lock().std_lane.append(&mut arrived);
                        return Ok(true);
                    }
                    DispatchOutcome::Rejected(msg) => {
                        self.local.lock().std_lane.push_back(msg);
                    }
                    DispatchOutcome::Failed(err) => {
                        self.local.lock().std_lane.append(&mut arrived);
                        return Err(err);
                    }
                }
            }
            // Nothing matched; the batch is buffered locally. Loop to
            // recompute the remaining timeout and wait again.
        }
    }

    /// Scans one local lane, dispatching each message in order.
    fn scan_local(
        &self,
        lane: Lane,
        dispatch: &mut dyn FnMut(Message) -> DispatchOutcome,
    ) -> Result<bool> {
        let mut idx = 0;
        loop {
            let msg = {
                let mut local = self.local.lock();
                let queue = lane.of(&mut local);
                if idx >= queue.len() {
                    return Ok(false);
                }
                queue.remove(idx).expect("scan index in bounds")
            };
            match dispatch(msg) {
                DispatchOutcome::Consumed => return Ok(true),
                DispatchOutcome::Failed(err) => return Err(err),
                DispatchOutcome::Rejected(msg) => {
                    let mut local = self.local.lock();
                    lane.of(&mut local).insert(idx, msg);
                    idx += 1;
                }
            }
        }
    }

    /// Closes the mailbox.
    ///
    /// Remaining messages are discarded after sweeping both standard lanes
    /// for `LinkDead` notices, which are reported to `on_link_dead` so the
    /// caller can keep its link/owner bookkeeping consistent. All waiters
    /// are woken so blocked producers observe the closure.
    pub(crate) fn close(&self, mut on_link_dead: impl FnMut(&Tid)) {
        let drained: Vec<Message> = {
            let mut shared = self.shared.lock();
            shared.closed = true;
            shared.pty_lane.clear();
            shared.std_lane.drain(..).collect()
        };
        self.put_signal.notify_all();
        self.not_full.notify_all();

        let local_drained: Vec<Message> = {
            let mut local = self.local.lock();
            local.pty_lane.clear();
            local.std_lane.drain(..).collect()
        };
        let mut dead = 0_usize;
        for msg in drained.iter().chain(local_drained.iter()) {
            if matches!(msg.kind, MessageKind::LinkDead) {
                if let Some(tid) = msg.payload.peek::<Tid>() {
                    on_link_dead(tid);
                    dead += 1;
                }
            }
        }
        trace!(
            mailbox = self.id,
            discarded = drained.len() + local_drained.len(),
            link_dead = dead,
            "mailbox closed"
        );
    }
}

/// Local lane selector for the receive scan.
#[derive(Clone, Copy)]
enum Lane {
    Standard,
    Priority,
}

impl Lane {
    fn of<'a>(self, local: &'a mut Local) -> &'a mut VecDeque<Message> {
        match self {
            Self::Standard => &mut local.std_lane,
            Self::Priority => &mut local.pty_lane,
        }
    }
}
