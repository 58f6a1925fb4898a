//! Tidings: typed message passing for in-process logical threads.
//!
//! # Overview
//!
//! A *logical thread* is an independent execution context with its own
//! stack. Many logical threads are multiplexed onto an execution
//! substrate — one OS thread each, or cooperatively scheduled stackful
//! coroutines sharing a single OS thread — selected by a pluggable
//! [`Scheduler`]. Communication is exclusively by asynchronous messages
//! addressed to opaque [`Tid`] handles; the public API shares no mutable
//! state.
//!
//! # Core guarantees
//!
//! - **Per-sender FIFO**: messages from one sender arrive in send order
//!   within a lane; priority messages overtake standard ones at dispatch
//! - **First-match receive**: an ordered, typed handler list decides each
//!   message; boolean handlers may decline and keep the message queued
//! - **Termination as data**: a dying thread's owner and linked peers each
//!   get exactly one in-band notice, matchable like any message and
//!   surfaced as an error when unmatched
//! - **Isolation at the boundary**: everything crossing threads is
//!   `Send + 'static`, checked by the compiler at construction
//!
//! # Example
//!
//! ```
//! use tidings::{receive_only, send, spawn, Handlers};
//!
//! let child = spawn(|| {
//!     let owner = tidings::owner_tid().expect("spawned threads have an owner");
//!     tidings::receive(
//!         Handlers::new()
//!             .on(|n: i32| { let _ = send(&owner, n * 2); })
//!             .on(|s: String| { let _ = send(&owner, format!("{s}{s}")); }),
//!     )
//!     .expect("receive");
//! });
//!
//! send(&child, 21_i32).expect("send");
//! assert_eq!(receive_only::<i32>().expect("reply"), 42);
//! ```
//!
//! # Module structure
//!
//! - [`tid`]: opaque thread handles
//! - [`message`]: type-erased payloads ([`Variant`])
//! - [`mailbox`]: dual-lane bounded queues and crowding policies
//! - [`receive`]: the first-match dispatcher
//! - [`scheduler`]: the substrate abstraction and both reference
//!   implementations
//! - [`process`]: spawn, links, ownership, teardown
//! - [`registry`]: process-wide name registry
//! - [`error`]: error taxonomy
//! - [`sync`]: scheduler-aware condition-variable analogs

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod mailbox;
pub mod message;
pub mod process;
pub mod receive;
pub mod registry;
pub mod scheduler;
pub mod sync;
#[cfg(feature = "tracing-integration")]
pub mod test_utils;
pub mod tid;
pub mod tracing_compat;

pub use error::{Error, ErrorKind, Result};
pub use mailbox::OnCrowding;
pub use message::Variant;
pub use process::{
    owner_tid, send, send_priority, set_max_mailbox_size, spawn, spawn_linked, this_tid,
    LinkTerminated, OwnerTerminated,
};
pub use receive::{receive, receive_only, receive_timeout, Handlers};
pub use registry::{locate, register, unregister};
pub use scheduler::{run, FiberScheduler, Scheduler, ThreadScheduler};
pub use sync::Signal;
pub use tid::Tid;
