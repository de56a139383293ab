//! The constants table: captured values threaded through compiled delegates.
//!
//! Emitted delegates never capture container state directly; every captured
//! value (pre-built instance, lifetime object, scope manager) occupies one
//! positional slot, and delegates load slots by index. The table is
//! append-only: writers push under a mutex and publish a new snapshot,
//! readers take the snapshot pointer without locking. Per-call runtime
//! arguments ride in a hole appended to a copy of the snapshot, never in
//! shared state.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::dispose::AnyArc;
use crate::error::{DiError, DiResult};
use crate::lifetime::Lifetime;
use crate::scope::ScopeManager;

#[derive(Clone)]
pub(crate) enum Slot {
    Instance(AnyArc),
    Lifetime(Arc<dyn Lifetime>),
    Scopes(Arc<ScopeManager>),
}

/// Read-side view of the constants table at one point in time, plus the
/// per-call runtime-arguments hole.
#[derive(Clone)]
pub(crate) struct Constants {
    slots: Arc<Vec<Slot>>,
    args: Option<AnyArc>,
}

impl Constants {
    pub(crate) fn instance(&self, index: usize) -> DiResult<AnyArc> {
        match self.slots.get(index) {
            Some(Slot::Instance(value)) => Ok(value.clone()),
            _ => Err(DiError::TypeMismatch("constants table instance slot")),
        }
    }

    pub(crate) fn lifetime(&self, index: usize) -> DiResult<Arc<dyn Lifetime>> {
        match self.slots.get(index) {
            Some(Slot::Lifetime(lifetime)) => Ok(lifetime.clone()),
            _ => Err(DiError::TypeMismatch("constants table lifetime slot")),
        }
    }

    pub(crate) fn scopes(&self, index: usize) -> DiResult<Arc<ScopeManager>> {
        match self.slots.get(index) {
            Some(Slot::Scopes(manager)) => Ok(manager.clone()),
            _ => Err(DiError::TypeMismatch("constants table scope-manager slot")),
        }
    }

    /// The runtime-arguments hole for this call, if the caller supplied one.
    pub(crate) fn args(&self) -> Option<&AnyArc> {
        self.args.as_ref()
    }

    /// A copy of this view carrying caller-supplied arguments in the last
    /// slot.
    pub(crate) fn with_args(&self, args: AnyArc) -> Constants {
        Constants {
            slots: self.slots.clone(),
            args: Some(args),
        }
    }
}

/// Append-only store of captured values.
pub(crate) struct ConstantsTable {
    write: Mutex<Vec<Slot>>,
    snapshot: ArcSwap<Vec<Slot>>,
}

impl ConstantsTable {
    pub(crate) fn new() -> Self {
        Self {
            write: Mutex::new(Vec::new()),
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    fn push(&self, slot: Slot) -> usize {
        let mut slots = self.write.lock();
        slots.push(slot);
        let index = slots.len() - 1;
        self.snapshot.store(Arc::new(slots.clone()));
        index
    }

    pub(crate) fn push_instance(&self, value: AnyArc) -> usize {
        self.push(Slot::Instance(value))
    }

    pub(crate) fn push_lifetime(&self, lifetime: Arc<dyn Lifetime>) -> usize {
        self.push(Slot::Lifetime(lifetime))
    }

    pub(crate) fn push_scopes(&self, manager: Arc<ScopeManager>) -> usize {
        self.push(Slot::Scopes(manager))
    }

    pub(crate) fn snapshot(&self) -> Constants {
        Constants {
            slots: self.snapshot.load_full(),
            args: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifetime::Transient;
    use crate::options::ScopeFlow;

    #[test]
    fn slots_are_index_addressable() {
        let table = ConstantsTable::new();
        let i0 = table.push_instance(Arc::new(Arc::new(10u32)) as AnyArc);
        let i1 = table.push_lifetime(Arc::new(Transient));
        let i2 = table.push_scopes(Arc::new(ScopeManager::new(ScopeFlow::PerThread)));
        assert_eq!((i0, i1, i2), (0, 1, 2));

        let snap = table.snapshot();
        assert!(snap.instance(0).is_ok());
        assert!(snap.lifetime(1).is_ok());
        assert!(snap.scopes(2).is_ok());
        // Wrong slot kind is a mismatch, not a panic.
        assert!(snap.instance(1).is_err());
    }

    #[test]
    fn older_snapshots_remain_valid() {
        let table = ConstantsTable::new();
        table.push_instance(Arc::new(Arc::new(1u32)) as AnyArc);
        let early = table.snapshot();
        table.push_instance(Arc::new(Arc::new(2u32)) as AnyArc);
        assert!(early.instance(0).is_ok());
        assert!(table.snapshot().instance(1).is_ok());
    }

    #[test]
    fn args_ride_on_a_copy() {
        let table = ConstantsTable::new();
        let snap = table.snapshot();
        assert!(snap.args().is_none());
        let with = snap.with_args(Arc::new((1u32, 2u32)) as AnyArc);
        assert!(with.args().is_some());
        assert!(snap.args().is_none());
    }
}
