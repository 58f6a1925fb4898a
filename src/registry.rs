//! Process-wide name registry.
//!
//! A single mutex guards the whole registry: one map from name to handle
//! and a reverse index so a terminating thread can drop all of its names
//! in one sweep. Maps are `BTreeMap`s, keeping iteration deterministic.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::tid::Tid;
use crate::tracing_compat::trace;

struct Registry {
    by_name: BTreeMap<String, Tid>,
    /// Reverse index keyed by mailbox id.
    names_of: BTreeMap<u64, Vec<String>>,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    by_name: BTreeMap::new(),
    names_of: BTreeMap::new(),
});

/// Binds `name` to `tid`.
///
/// Returns false (and binds nothing) when the name is already taken or
/// the thread behind `tid` has terminated. A thread may hold any number
/// of names; all of them are dropped when it terminates.
pub fn register(name: impl Into<String>, tid: &Tid) -> bool {
    let name = name.into();
    if tid.mailbox().is_closed() {
        return false;
    }
    let mut registry = REGISTRY.lock();
    if registry.by_name.contains_key(&name) {
        return false;
    }
    trace!(name = %name, tid = %tid, "registered name");
    registry.by_name.insert(name.clone(), tid.clone());
    registry.names_of.entry(tid.id()).or_default().push(name);
    true
}

/// Removes a name binding. Returns false when the name was not bound.
pub fn unregister(name: &str) -> bool {
    let mut registry = REGISTRY.lock();
    let Some(tid) = registry.by_name.remove(name) else {
        return false;
    };
    if let Some(names) = registry.names_of.get_mut(&tid.id()) {
        names.retain(|n| n != name);
        if names.is_empty() {
            registry.names_of.remove(&tid.id());
        }
    }
    true
}

/// Looks a name up.
#[must_use]
pub fn locate(name: &str) -> Option<Tid> {
    REGISTRY.lock().by_name.get(name).cloned()
}

/// Drops every name bound to `tid`. Called during thread teardown.
pub(crate) fn unregister_all(tid: &Tid) {
    let mut registry = REGISTRY.lock();
    if let Some(names) = registry.names_of.remove(&tid.id()) {
        trace!(tid = %tid, count = names.len(), "dropping registered names");
        for name in names {
            registry.by_name.remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::Mailbox;
    use crate::sync::Signal;
    use std::sync::Arc;

    fn fresh() -> Tid {
        Tid::new(Arc::new(Mailbox::new(Signal::thread(), Signal::thread())))
    }

    /// Names are namespaced per test: the registry is process-global and
    /// unit tests share the process.
    #[test]
    fn register_locate_unregister() {
        let tid = fresh();
        assert!(register("registry::basic", &tid));
        assert_eq!(locate("registry::basic"), Some(tid));
        assert!(unregister("registry::basic"));
        assert_eq!(locate("registry::basic"), None);
        assert!(!unregister("registry::basic"));
    }

    #[test]
    fn duplicate_name_is_refused() {
        let a = fresh();
        let b = fresh();
        assert!(register("registry::dup", &a));
        assert!(!register("registry::dup", &b));
        assert_eq!(locate("registry::dup"), Some(a));
        unregister("registry::dup");
    }

    #[test]
    fn closed_mailbox_cannot_be_registered() {
        let tid = fresh();
        tid.mailbox().close(|_| {});
        assert!(!register("registry::closed", &tid));
    }

    #[test]
    fn unregister_all_sweeps_every_alias() {
        let tid = fresh();
        assert!(register("registry::alias-a", &tid));
        assert!(register("registry::alias-b", &tid));
        unregister_all(&tid);
        assert_eq!(locate("registry::alias-a"), None);
        assert_eq!(locate("registry::alias-b"), None);
    }
}
