//! Error types and error handling strategy.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Termination events double as in-band messages:
//!   [`OwnerTerminated`](crate::OwnerTerminated) and
//!   [`LinkTerminated`](crate::LinkTerminated) are only surfaced as errors
//!   when no receive handler accepted the corresponding event
//! - Errors during thread teardown are swallowed; cleanup is unconditional

use core::fmt;

use crate::message::Variant;
use crate::tid::Tid;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `receive_only` saw a message that does not match the requested type.
    /// The message is consumed.
    MessageMismatch,
    /// The owning thread terminated and no handler accepted the event.
    OwnerTerminated,
    /// A linked thread terminated and no handler accepted the event.
    LinkTerminated,
    /// A priority message arrived with no matching handler. Priority
    /// messages are never silently dropped.
    PriorityMismatch,
    /// The target mailbox is bounded, full, and configured to fail senders.
    MailboxFull,
    /// The target mailbox has been closed; the message was discarded.
    MailboxClosed,
    /// The calling thread has no owner.
    NoOwner,
}

/// The error type for messaging operations.
///
/// Carries the [`ErrorKind`], optional context text, the [`Tid`] the error
/// concerns (the terminated peer, the full mailbox), and — for
/// [`ErrorKind::PriorityMismatch`] — the unmatched payload itself, so that
/// callers can still recover the message.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    tid: Option<Tid>,
    payload: Option<Variant>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            tid: None,
            payload: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Attaches the handle the error concerns.
    #[must_use]
    pub fn with_tid(mut self, tid: Tid) -> Self {
        self.tid = Some(tid);
        self
    }

    /// Returns the handle the error concerns, if any.
    #[must_use]
    pub fn tid(&self) -> Option<&Tid> {
        self.tid.as_ref()
    }

    /// Returns true if this error reports owner termination.
    #[must_use]
    pub const fn is_owner_terminated(&self) -> bool {
        matches!(self.kind, ErrorKind::OwnerTerminated)
    }

    /// Returns true if this error reports linked-peer termination.
    #[must_use]
    pub const fn is_link_terminated(&self) -> bool {
        matches!(self.kind, ErrorKind::LinkTerminated)
    }

    /// Takes the unmatched payload out of a priority-mismatch error.
    #[must_use]
    pub fn into_payload(self) -> Option<Variant> {
        self.payload
    }

    /// Owner termination, optionally naming the terminated owner.
    ///
    /// The owner is unknown when a closed mailbox is drained after the
    /// fact, so the handle is optional.
    #[must_use]
    pub fn owner_terminated(tid: Option<Tid>) -> Self {
        let mut err = Self::new(ErrorKind::OwnerTerminated);
        err.tid = tid;
        err
    }

    /// Linked-peer termination.
    #[must_use]
    pub fn link_terminated(tid: Tid) -> Self {
        Self::new(ErrorKind::LinkTerminated).with_tid(tid)
    }

    /// Priority message with no matching handler; carries the payload.
    #[must_use]
    pub fn priority_mismatch(payload: Variant) -> Self {
        let mut err = Self::new(ErrorKind::PriorityMismatch);
        err.payload = Some(payload);
        err
    }

    /// `receive_only` type mismatch.
    ///
    /// The message text is load-bearing: callers relay it across threads in
    /// diagnostics, so it names both the expected and the actual type.
    #[must_use]
    pub fn message_mismatch(expected: &str, got: &str) -> Self {
        Self::new(ErrorKind::MessageMismatch).with_context(format!(
            "Unexpected message type: expected '{expected}', got '{got}'"
        ))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            return write!(f, "{ctx}");
        }
        write!(f, "{:?}", self.kind)?;
        if let Some(tid) = &self.tid {
            write!(f, ": {tid}")?;
        }
        if let Some(payload) = &self.payload {
            write!(f, ": unmatched '{}'", payload.type_name())?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// A specialized Result type for messaging operations.
pub type Result<T> = core::result::Result<T, Error>;
