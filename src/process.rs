//! Logical-thread lifecycle: identity, ownership, links, spawn, teardown.
//!
//! Every logical thread has a [`ThreadInfo`]: its own handle, its owner
//! (the thread that spawned it), and the set of peers to notify when it
//! dies. The info lives in fiber-local state under a cooperative scheduler
//! and in plain thread-local state otherwise, created lazily the first
//! time a thread participates in messaging.
//!
//! Termination flows as data: teardown closes the mailbox and delivers one
//! `LinkDead(self)` control message to each peer in `owner ∪ links`. The
//! receive dispatcher turns those into [`OwnerTerminated`] /
//! [`LinkTerminated`] events (see [`crate::receive`]).

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};
use crate::mailbox::{Mailbox, OnCrowding};
use crate::message::{Message, Variant};
use crate::tid::Tid;
use crate::tracing_compat::{debug, error, trace};

/// Event observed by a thread whose owner terminated.
///
/// Delivered through `receive` like any other message type; when no
/// handler accepts it, `receive` returns [`ErrorKind::OwnerTerminated`]
/// instead.
#[derive(Debug, Clone)]
pub struct OwnerTerminated(pub Tid);

/// Event observed by a thread whose linked peer terminated.
///
/// Delivered through `receive` like any other message type; when no
/// handler accepts it, `receive` returns [`ErrorKind::LinkTerminated`]
/// instead.
#[derive(Debug, Clone)]
pub struct LinkTerminated(pub Tid);

/// Per-logical-thread state.
///
/// Links are keyed deterministically (handles order by mailbox id); the
/// flag records whether the peer asked for termination to be surfaced
/// back (`spawn_linked`) or is a plain child.
#[derive(Debug, Default)]
pub(crate) struct ThreadInfo {
    pub(crate) ident: Option<Tid>,
    pub(crate) owner: Option<Tid>,
    pub(crate) links: BTreeMap<Tid, bool>,
}

impl ThreadInfo {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

thread_local! {
    /// Fallback state for threads not managed by any scheduler.
    static OS_INFO: RefCell<ThreadInfo> = RefCell::new(ThreadInfo::new());
}

/// Runs `f` against the calling logical thread's info: the running
/// fiber's, or the OS thread's own.
pub(crate) fn with_info<R>(f: impl FnOnce(&mut ThreadInfo) -> R) -> R {
    if let Some(info) = crate::scheduler::active_info() {
        let mut info = info.borrow_mut();
        f(&mut info)
    } else {
        OS_INFO.with(|cell| f(&mut cell.borrow_mut()))
    }
}

fn new_tid() -> Tid {
    let (put, not_full) = crate::scheduler::new_signal_pair();
    Tid::new(Arc::new(Mailbox::new(put, not_full)))
}

/// The calling thread's own handle, creating its mailbox on first use.
#[must_use]
pub fn this_tid() -> Tid {
    if let Some(tid) = with_info(|info| info.ident.clone()) {
        return tid;
    }
    let tid = new_tid();
    trace!(tid = %tid, "lazily created mailbox for participating thread");
    with_info(|info| info.ident = Some(tid.clone()));
    tid
}

/// The handle of the thread that spawned the caller.
///
/// # Errors
///
/// [`ErrorKind::NoOwner`] when the caller was not spawned by anyone (or
/// its owner already terminated and the notice was dispatched).
pub fn owner_tid() -> Result<Tid> {
    with_info(|info| info.owner.clone())
        .ok_or_else(|| Error::new(ErrorKind::NoOwner).with_context("thread has no owner"))
}

/// Spawns a new logical thread running `f`.
///
/// The child's owner is the caller. The `Send + 'static` bound is the
/// isolation check: state reachable from `f` must not alias the caller's
/// mutable data.
///
/// ```compile_fail
/// use std::rc::Rc;
/// let shared = Rc::new(1);
/// // Rc must not cross the thread boundary.
/// tidings::spawn(move || drop(shared));
/// ```
pub fn spawn<F>(f: F) -> Tid
where
    F: FnOnce() + Send + 'static,
{
    spawn_impl(false, f)
}

/// Spawns a new logical thread and links it to the caller: the caller
/// will observe [`LinkTerminated`] when the child dies.
pub fn spawn_linked<F>(f: F) -> Tid
where
    F: FnOnce() + Send + 'static,
{
    spawn_impl(true, f)
}

fn spawn_impl<F>(linked: bool, f: F) -> Tid
where
    F: FnOnce() + Send + 'static,
{
    let child = new_tid();
    let parent = this_tid();
    with_info(|info| info.links.insert(child.clone(), linked));
    debug!(child = %child, parent = %parent, linked, "spawning logical thread");

    let ident = child.clone();
    crate::scheduler::spawn_op(Box::new(move || entry(ident, Some(parent), f)));
    child
}

/// Entry shim for [`crate::run`]'s body: a root logical thread with no
/// owner and a lazily created identity.
pub(crate) fn run_entry<F: FnOnce()>(body: F) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(body));
    cleanup();
    if let Err(payload) = outcome {
        error!(
            panic = panic_message(payload.as_ref()),
            "scheduler body panicked"
        );
    }
}

/// Entry shim for spawned threads: installs identity and ownership before
/// the user body can observe them, and tears down on every exit path.
fn entry<F: FnOnce()>(ident: Tid, owner: Option<Tid>, f: F) {
    with_info(|info| {
        info.ident = Some(ident);
        info.owner = owner;
    });
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
    cleanup();
    if let Err(payload) = outcome {
        // Logged and absorbed: one thread's death must not tear down
        // unrelated peers; interested peers hear about it via LinkDead.
        error!(
            panic = panic_message(payload.as_ref()),
            "logical thread panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// Role a dead peer played for the receiving thread, decided while the
/// bookkeeping is pruned.
pub(crate) enum DeadPeer {
    Owner,
    LinkedBack,
    Plain,
}

/// Prunes `peer` from the caller's owner/link bookkeeping and reports
/// which role it had.
pub(crate) fn note_link_dead(peer: &Tid) -> DeadPeer {
    with_info(|info| {
        let was_owner = info.owner.as_ref() == Some(peer);
        if was_owner {
            info.owner = None;
        }
        let link_back = info.links.remove(peer);
        if was_owner {
            DeadPeer::Owner
        } else if link_back == Some(true) {
            DeadPeer::LinkedBack
        } else {
            DeadPeer::Plain
        }
    })
}

/// Tears down the calling logical thread's messaging state.
///
/// Closes the mailbox (sweeping queued `LinkDead` notices into the
/// bookkeeping first, so already-dead peers are not notified), sends one
/// `LinkDead(self)` to each remaining peer in `owner ∪ links`, and drops
/// any registered names. Teardown must be unconditional, so every error
/// along the way is swallowed.
pub(crate) fn cleanup() {
    let Some(me) = with_info(|info| info.ident.clone()) else {
        return;
    };
    me.mailbox().close(|dead| {
        let _ = note_link_dead(dead);
    });

    let (owner, links) = with_info(|info| (info.owner.take(), std::mem::take(&mut info.links)));
    let mut notified = 0_usize;
    for peer in links.keys() {
        let _ = peer.mailbox().put(Message::link_dead(me.clone()), peer);
        notified += 1;
    }
    if let Some(owner) = owner {
        if !links.contains_key(&owner) {
            let _ = owner.mailbox().put(Message::link_dead(me.clone()), &owner);
            notified += 1;
        }
    }
    crate::registry::unregister_all(&me);
    with_info(|info| info.ident = None);
    trace!(tid = %me, notified, "logical thread terminated");
}

/// Sends `value` to `tid`'s standard lane.
///
/// Several values at once are one tuple value:
/// `send(&tid, (count, label))`. The `Send + 'static` bound is the
/// isolation check — see [`Variant`].
///
/// # Errors
///
/// [`ErrorKind::MailboxClosed`] if the target has terminated (the value is
/// discarded, matching fire-and-forget semantics; callers may ignore it),
/// [`ErrorKind::MailboxFull`] under the `Fail` crowding policy.
pub fn send<T: Any + Send>(tid: &Tid, value: T) -> Result<()> {
    tid.mailbox().put(Message::standard(Variant::new(value)), tid)
}

/// Sends `value` to `tid`'s priority lane: it overtakes buffered standard
/// messages and must be matched by the receiver, or their receive fails
/// with [`ErrorKind::PriorityMismatch`].
///
/// # Errors
///
/// [`ErrorKind::MailboxClosed`] if the target has terminated.
pub fn send_priority<T: Any + Send>(tid: &Tid, value: T) -> Result<()> {
    tid.mailbox().put(Message::priority(Variant::new(value)), tid)
}

/// Bounds `tid`'s mailbox at `max_msgs` standard messages (0 = unbounded)
/// and selects the policy applied to senders that hit the bound.
pub fn set_max_mailbox_size(tid: &Tid, max_msgs: usize, on_crowding: OnCrowding) {
    tid.mailbox().set_max(max_msgs, on_crowding);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn this_tid_is_stable_within_a_thread() {
        let a = this_tid();
        let b = this_tid();
        assert_eq!(a, b);
    }

    #[test]
    fn this_tid_differs_across_threads() {
        let here = this_tid();
        let there = std::thread::spawn(this_tid).join().expect("join");
        assert_ne!(here, there);
    }

    #[test]
    fn owner_tid_fails_for_unowned_thread() {
        // Run on a fresh OS thread so other tests' state cannot interfere.
        std::thread::spawn(|| {
            let err = owner_tid().expect_err("root thread has no owner");
            assert_eq!(err.kind(), ErrorKind::NoOwner);
        })
        .join()
        .expect("join");
    }

    #[test]
    fn spawned_thread_sees_spawner_as_owner() {
        spawn(move || {
            let owner = owner_tid().expect("spawned thread has an owner");
            let _ = send(&owner, owner == this_tid());
        });
        // `false`: the child's owner is us, not the child itself.
        assert!(!crate::receive_only::<bool>().expect("reply"));
    }

    #[test]
    fn cleanup_notifies_owner_exactly_once_when_also_linked() {
        // A linked child has its parent in no set of its own; dedup is
        // about a thread whose owner ALSO appears in its links. Simulate
        // by linking back manually.
        std::thread::spawn(|| {
            let me = this_tid();
            let observer = new_tid();
            with_info(|info| {
                info.owner = Some(observer.clone());
                info.links.insert(observer.clone(), true);
            });
            cleanup();

            // Exactly one LinkDead notice.
            assert_eq!(observer.mailbox().queued_len(), 1);
            let _ = me;
        })
        .join()
        .expect("join");
    }

    #[test]
    fn cleanup_retires_identity() {
        std::thread::spawn(|| {
            let first = this_tid();
            cleanup();
            let second = this_tid();
            assert_ne!(first, second, "cleanup retires the identity");
            assert!(first.mailbox().is_closed());
        })
        .join()
        .expect("join");
    }

    #[test]
    fn send_to_terminated_thread_reports_closed() {
        let tid = new_tid();
        tid.mailbox().close(|_| {});
        let err = send(&tid, 1_i32).expect_err("closed mailbox");
        assert_eq!(err.kind(), ErrorKind::MailboxClosed);
    }
}
