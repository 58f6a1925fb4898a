//! First-match receive over an ordered list of typed handlers.
//!
//! [`Handlers`] is the dispatch table: an ordered list of typed entries
//! walked in registration order for every candidate message. The first
//! entry whose type matches decides the message's fate; a boolean
//! (`on_filter`) entry may decline, in which case the walk continues as if
//! that entry had not matched. An optional trailing catch-all accepts
//! anything, so it must come last — anything registered after it could
//! never fire.
//!
//! Control messages never reach user handlers directly. A `LinkDead`
//! notice prunes the dead peer from the caller's bookkeeping, then — for
//! owners and link-back peers — is re-dispatched as a typed
//! [`OwnerTerminated`] / [`LinkTerminated`] event through the same handler
//! walk. Unhandled events surface as errors from `receive`.

use std::any::{Any, TypeId};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::mailbox::DispatchOutcome;
use crate::message::{Message, MessageKind, Variant};
use crate::process::{self, DeadPeer, LinkTerminated, OwnerTerminated};
use crate::tid::Tid;

/// An ordered, typed handler list for [`receive`].
///
/// Handlers borrow freely from the enclosing scope; a receive is a
/// synchronous scan, not a stored subscription.
///
/// # Panics
///
/// Registration panics on a duplicate parameter type and on any handler
/// added after the catch-all; both are programming errors, caught as
/// early as a runtime builder can.
#[must_use = "a handler list does nothing until passed to receive"]
#[derive(Default)]
pub struct Handlers<'a> {
    entries: Vec<Entry<'a>>,
    catch_all: Option<Box<dyn FnMut(Variant) + 'a>>,
}

struct Entry<'a> {
    type_id: TypeId,
    type_name: &'static str,
    kind: HandlerKind<'a>,
}

enum HandlerKind<'a> {
    /// Accepts and consumes on type match.
    Consume(Box<dyn FnMut(Variant) + 'a>),
    /// May decline: `false` continues the walk, leaving the message
    /// queued.
    Filter(Box<dyn FnMut(&Variant) -> bool + 'a>),
}

impl<'a> Handlers<'a> {
    /// Creates an empty handler list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler consuming messages of type `T`.
    pub fn on<T, F>(mut self, mut f: F) -> Self
    where
        T: Any + Send,
        F: FnMut(T) + 'a,
    {
        self.push(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            HandlerKind::Consume(Box::new(move |variant: Variant| {
                if let Ok(value) = variant.take::<T>() {
                    f(value);
                } else {
                    unreachable!("dispatch is gated on the type id");
                }
            })),
        );
        self
    }

    /// Appends a boolean handler for type `T`: return `true` to accept
    /// the message, `false` to keep walking as if this handler had not
    /// matched (the message stays queued for a later receive).
    pub fn on_filter<T, F>(mut self, mut f: F) -> Self
    where
        T: Any + Send,
        F: FnMut(&T) -> bool + 'a,
    {
        self.push(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            HandlerKind::Filter(Box::new(move |variant: &Variant| {
                variant.peek::<T>().is_some_and(&mut f)
            })),
        );
        self
    }

    /// Appends the catch-all handler. It accepts every message and must
    /// be the last handler registered.
    pub fn any<F>(mut self, f: F) -> Self
    where
        F: FnMut(Variant) + 'a,
    {
        assert!(
            self.catch_all.is_none(),
            "catch-all receive handler registered twice"
        );
        self.catch_all = Some(Box::new(f));
        self
    }

    fn push(&mut self, type_id: TypeId, type_name: &'static str, kind: HandlerKind<'a>) {
        assert!(
            self.catch_all.is_none(),
            "receive handler registered after the catch-all, which would occlude it"
        );
        assert!(
            self.entries.iter().all(|e| e.type_id != type_id),
            "duplicate receive handler for type `{type_name}`"
        );
        self.entries.push(Entry {
            type_id,
            type_name,
            kind,
        });
    }

    /// First-match walk over the handler list.
    ///
    /// "Declined" and "no match" are kept apart: the priority lane
    /// re-queues a declined message but raises on a message nothing could
    /// ever match.
    fn try_match(&mut self, payload: Variant) -> Walk {
        let mut declined = false;
        for entry in &mut self.entries {
            if entry.type_id != payload.type_id() {
                continue;
            }
            match &mut entry.kind {
                HandlerKind::Consume(f) => {
                    f(payload);
                    return Walk::Accepted;
                }
                HandlerKind::Filter(f) => {
                    if f(&payload) {
                        return Walk::Accepted;
                    }
                    declined = true;
                }
            }
        }
        if let Some(f) = &mut self.catch_all {
            f(payload);
            return Walk::Accepted;
        }
        if declined {
            Walk::Declined(payload)
        } else {
            Walk::NoMatch(payload)
        }
    }
}

/// Outcome of one first-match walk.
enum Walk {
    /// Some handler accepted and consumed the payload.
    Accepted,
    /// A type-matching boolean handler returned false; the walk continued
    /// as if unmatched and the payload is handed back to stay queued.
    Declined(Variant),
    /// No handler's parameter type matched the payload at all.
    NoMatch(Variant),
}

impl std::fmt::Debug for Handlers<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let types: Vec<&str> = self.entries.iter().map(|e| e.type_name).collect();
        f.debug_struct("Handlers")
            .field("types", &types)
            .field("catch_all", &self.catch_all.is_some())
            .finish()
    }
}

/// Turns a `LinkDead` notice into bookkeeping plus, where the relation
/// warrants it, a synthetic typed event re-dispatched through `try_match`.
fn dispatch_link_dead(
    payload: Variant,
    try_match: &mut dyn FnMut(Variant) -> core::result::Result<(), Variant>,
) -> DispatchOutcome {
    let Ok(peer) = payload.take::<Tid>() else {
        // A control message always carries the dead peer's handle.
        return DispatchOutcome::Consumed;
    };
    match process::note_link_dead(&peer) {
        DeadPeer::Owner => match try_match(Variant::new(OwnerTerminated(peer.clone()))) {
            Ok(()) => DispatchOutcome::Consumed,
            Err(_) => DispatchOutcome::Failed(Error::owner_terminated(Some(peer))),
        },
        DeadPeer::LinkedBack => match try_match(Variant::new(LinkTerminated(peer.clone()))) {
            Ok(()) => DispatchOutcome::Consumed,
            Err(_) => DispatchOutcome::Failed(Error::link_terminated(peer)),
        },
        DeadPeer::Plain => DispatchOutcome::Consumed,
    }
}

fn receive_impl(mut handlers: Handlers<'_>, timeout: Option<Duration>) -> Result<bool> {
    let me = process::this_tid();
    let mut dispatch = |msg: Message| -> DispatchOutcome {
        match msg.kind {
            MessageKind::LinkDead => {
                dispatch_link_dead(msg.payload, &mut |event| match handlers.try_match(event) {
                    Walk::Accepted => Ok(()),
                    Walk::Declined(event) | Walk::NoMatch(event) => Err(event),
                })
            }
            MessageKind::Priority => match handlers.try_match(msg.payload) {
                Walk::Accepted => DispatchOutcome::Consumed,
                // Boolean-handler continuation is lane-agnostic: a decline
                // leaves the message queued in the priority lane.
                Walk::Declined(payload) => {
                    DispatchOutcome::Rejected(Message::priority(payload))
                }
                Walk::NoMatch(payload) => {
                    DispatchOutcome::Failed(Error::priority_mismatch(payload))
                }
            },
            MessageKind::Standard => match handlers.try_match(msg.payload) {
                Walk::Accepted => DispatchOutcome::Consumed,
                Walk::Declined(payload) | Walk::NoMatch(payload) => {
                    DispatchOutcome::Rejected(Message::standard(payload))
                }
            },
        }
    };
    me.mailbox().get(&mut dispatch, timeout)
}

/// Receives one message accepted by `handlers`, blocking until one
/// arrives.
///
/// # Errors
///
/// [`crate::ErrorKind::OwnerTerminated`] / `LinkTerminated` for unhandled
/// termination events, [`crate::ErrorKind::PriorityMismatch`] for a
/// priority message nothing matched.
pub fn receive(handlers: Handlers<'_>) -> Result<()> {
    receive_impl(handlers, None).map(|_| ())
}

/// Like [`receive`], but gives up after `timeout`.
///
/// Returns `Ok(false)` if no matching message was extracted before the
/// deadline. A zero timeout performs a single scan without waiting.
///
/// # Errors
///
/// Same as [`receive`].
pub fn receive_timeout(timeout: Duration, handlers: Handlers<'_>) -> Result<bool> {
    receive_impl(handlers, Some(timeout))
}

/// Receives one message that must be a `T` (or a tuple type for several
/// values at once).
///
/// # Errors
///
/// [`crate::ErrorKind::MessageMismatch`] if the next standard message is
/// not a `T`; the message is consumed and the error text names both
/// types. Termination events surface as in [`receive`].
pub fn receive_only<T: Any + Send>() -> Result<T> {
    let me = process::this_tid();
    let mut received: Option<T> = None;
    let mut dispatch = |msg: Message| -> DispatchOutcome {
        match msg.kind {
            MessageKind::LinkDead => {
                // No handlers: synthesized events always surface as errors.
                dispatch_link_dead(msg.payload, &mut |event: Variant| Err(event))
            }
            kind => match msg.payload.take::<T>() {
                Ok(value) => {
                    received = Some(value);
                    DispatchOutcome::Consumed
                }
                Err(payload) => DispatchOutcome::Failed(match kind {
                    MessageKind::Priority => Error::priority_mismatch(payload),
                    _ => Error::message_mismatch(
                        std::any::type_name::<T>(),
                        payload.type_name(),
                    ),
                }),
            },
        }
    };
    me.mailbox().get(&mut dispatch, None)?;
    received.ok_or_else(|| {
        // `get` without a timeout only returns after a consumption.
        Error::new(crate::error::ErrorKind::MessageMismatch)
            .with_context("receive_only completed without a value")
    })
}
