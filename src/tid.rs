//! Opaque thread handles.

use core::fmt;
use std::sync::Arc;

use crate::mailbox::Mailbox;

/// A handle addressing exactly one mailbox.
///
/// `Tid` is cheap to clone, freely passed inside messages, and remains
/// valid after the referenced thread has terminated — sends then become
/// no-ops into the closed mailbox. Equality and hashing are identity of
/// the referenced mailbox.
///
/// Handles are intrinsically shareable across threads even though they
/// reference shared state: the mailbox is the one sanctioned
/// synchronization point, so `Tid` is `Send + Sync` by construction.
#[derive(Clone)]
pub struct Tid {
    mbox: Arc<Mailbox>,
}

impl Tid {
    pub(crate) fn new(mbox: Arc<Mailbox>) -> Self {
        Self { mbox }
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.mbox
    }

    /// Stable numeric id of the referenced mailbox, for log correlation.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.mbox.id()
    }
}

impl PartialEq for Tid {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.mbox, &other.mbox)
    }
}

impl Eq for Tid {}

// Ordering by mailbox id is consistent with identity equality: ids are
// unique per mailbox. Handles order deterministically in link sets.
impl PartialOrd for Tid {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tid {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.mbox.id().cmp(&other.mbox.id())
    }
}

impl std::hash::Hash for Tid {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.mbox.id().hash(state);
    }
}

impl fmt::Debug for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tid({})", self.mbox.id())
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.mbox.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Signal;

    fn fresh() -> Tid {
        Tid::new(Arc::new(Mailbox::new(Signal::thread(), Signal::thread())))
    }

    #[test]
    fn clones_are_equal_distinct_handles_are_not() {
        let a = fresh();
        let b = a.clone();
        let c = fresh();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn display_uses_mailbox_id() {
        let a = fresh();
        assert_eq!(format!("{a}"), format!("T{}", a.id()));
        assert_eq!(format!("{a:?}"), format!("Tid({})", a.id()));
    }

    #[test]
    fn ids_are_unique_and_monotone() {
        let a = fresh();
        let b = fresh();
        assert!(b.id() > a.id());
    }
}
