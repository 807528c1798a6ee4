//! # Device slot table.
//!
//! One [`DeviceSlot`] per device, fixed after load. Two lock levels:
//!
//! ```text
//! DeviceTable.lock   (table-wide: connect, removal, dump)
//!   └─► DeviceSlot.state   (per slot: owner / shared entries; cookie lookups)
//! ```
//!
//! Always acquire in that order. The busy flag is an atomic outside both locks:
//! only the owning exclusive session clears it, and only a connect holding the
//! table lock sets it.
//!
//! Entries are weak and carry the endpoint id, so lookups by endpoint never
//! need to promote a non-matching entry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::external::EndpointId;
use crate::session::{ExclusiveSession, SharedSession};

/// Weak slot entry tagged with its client's endpoint.
pub(crate) struct Entry<T> {
    pub endpoint: EndpointId,
    pub session: Weak<T>,
}

impl<T> Entry<T> {
    pub(crate) fn new(endpoint: EndpointId, session: Weak<T>) -> Self {
        Self { endpoint, session }
    }

    #[inline]
    pub(crate) fn is_dead(&self) -> bool {
        self.session.strong_count() == 0
    }

    #[inline]
    pub(crate) fn upgrade(&self) -> Option<Arc<T>> {
        self.session.upgrade()
    }
}

#[derive(Default)]
pub(crate) struct SlotState {
    pub owner: Option<Entry<ExclusiveSession>>,
    pub shared: Vec<Entry<SharedSession>>,
}

impl SlotState {
    /// Clears a dead owner entry.
    pub(crate) fn prune_owner(&mut self) {
        if self.owner.as_ref().is_some_and(Entry::is_dead) {
            self.owner = None;
        }
    }

    /// Removes every shared entry whose session is gone.
    pub(crate) fn prune_shared(&mut self) {
        self.shared.retain(|e| !e.is_dead());
    }

    /// Removes the owner entry if it refers to `session`.
    pub(crate) fn take_owner_if(&mut self, session: &Weak<ExclusiveSession>) -> bool {
        match &self.owner {
            Some(entry) if Weak::ptr_eq(&entry.session, session) => {
                self.owner = None;
                true
            }
            _ => false,
        }
    }

    /// Removes the shared entry referring to `session`, pruning dead ones on the way.
    pub(crate) fn take_shared(&mut self, session: &Weak<SharedSession>) -> bool {
        let before = self.shared.len();
        self.shared
            .retain(|e| !e.is_dead() && !Weak::ptr_eq(&e.session, session));
        self.shared.len() != before
    }
}

pub(crate) struct DeviceSlot {
    busy: AtomicBool,
    state: Mutex<SlotState>,
}

impl DeviceSlot {
    fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            state: Mutex::new(SlotState::default()),
        }
    }

    #[inline]
    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_busy(&self) {
        self.busy.store(true, Ordering::Release);
    }

    /// Clears the busy flag, returning its previous value.
    #[inline]
    pub(crate) fn set_free(&self) -> bool {
        self.busy.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock()
    }
}

pub(crate) struct DeviceTable {
    lock: Mutex<()>,
    slots: Vec<DeviceSlot>,
}

impl DeviceTable {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            lock: Mutex::new(()),
            slots: (0..count).map(|_| DeviceSlot::new()).collect(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.lock.try_lock()
    }

    pub(crate) fn slot(&self, index: usize) -> Option<&DeviceSlot> {
        self.slots.get(index)
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = (usize, &DeviceSlot)> {
        self.slots.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_flag_round_trip() {
        let table = DeviceTable::new(2);
        let slot = table.slot(1).expect("slot");
        assert!(!slot.is_busy());
        slot.set_busy();
        assert!(slot.is_busy());
        assert!(slot.set_free());
        assert!(!slot.set_free());
        assert!(table.slot(2).is_none());
    }

    #[test]
    fn dead_entries_are_pruned() {
        let mut state = SlotState::default();
        state.shared.push(Entry::new(EndpointId(1), Weak::new()));
        state.shared.push(Entry::new(EndpointId(2), Weak::new()));
        state.owner = Some(Entry::new(EndpointId(3), Weak::new()));

        state.prune_shared();
        state.prune_owner();
        assert!(state.shared.is_empty());
        assert!(state.owner.is_none());
    }
}
