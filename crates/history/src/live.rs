use std::collections::{BTreeMap, HashMap};

use tempora_common::EntityId;

/// Access to the live value a history store records and restores.
///
/// Implemented by collaborators that own the actual state (a component
/// column, an inventory table, ...).
pub trait LiveState<T> {
    /// Current value for `id`, or `None` if the object has no live state.
    fn capture(&self, id: EntityId) -> Option<T>;

    /// Overwrite the live value for `id`.
    fn restore(&mut self, id: EntityId, value: T);
}

impl<T: Clone> LiveState<T> for BTreeMap<EntityId, T> {
    fn capture(&self, id: EntityId) -> Option<T> {
        self.get(&id).cloned()
    }

    fn restore(&mut self, id: EntityId, value: T) {
        self.insert(id, value);
    }
}

impl<T: Clone> LiveState<T> for HashMap<EntityId, T> {
    fn capture(&self, id: EntityId) -> Option<T> {
        self.get(&id).cloned()
    }

    fn restore(&mut self, id: EntityId, value: T) {
        self.insert(id, value);
    }
}
