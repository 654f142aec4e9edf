//! Per-entity runtime state arena
//!
//! Every behavior stores its scratch data here, keyed by entity identity.
//! A record exists only between `init` and `clean` for that entity.

use rustc_hash::FxHashMap;

use crate::entity::EntityId;

#[derive(Debug, Clone)]
pub struct EntityStates<S> {
    states: FxHashMap<EntityId, S>,
}

impl<S> EntityStates<S> {
    pub fn new() -> Self {
        Self {
            states: FxHashMap::default(),
        }
    }

    /// Existing record for `id`, or a fresh one built by `init`
    pub fn get_or_init(&mut self, id: EntityId, init: impl FnOnce() -> S) -> &mut S {
        self.states.entry(id).or_insert_with(init)
    }

    /// Store a record, returning any previous one
    pub fn insert(&mut self, id: EntityId, state: S) -> Option<S> {
        self.states.insert(id, state)
    }

    pub fn get(&self, id: EntityId) -> Option<&S> {
        self.states.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut S> {
        self.states.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<S> {
        self.states.remove(&id)
    }

    /// Drop every record, returning them so callers can release resources
    pub fn drain(&mut self) -> impl Iterator<Item = (EntityId, S)> + '_ {
        self.states.drain()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.states.keys().copied()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut S> {
        self.states.values_mut()
    }
}

impl<S> Default for EntityStates<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_init_reuses_record() {
        let mut states: EntityStates<u32> = EntityStates::new();
        let id = EntityId::new();

        *states.get_or_init(id, || 1) += 10;
        let value = *states.get_or_init(id, || 99);

        assert_eq!(value, 11);
        assert_eq!(states.len(), 1);
    }

    #[test]
    fn test_remove_then_init_is_fresh() {
        let mut states: EntityStates<u32> = EntityStates::new();
        let id = EntityId::new();

        *states.get_or_init(id, || 0) = 42;
        assert_eq!(states.remove(id), Some(42));
        assert!(!states.contains(id));

        assert_eq!(*states.get_or_init(id, || 0), 0);
    }

    #[test]
    fn test_distinct_entities_get_distinct_slots() {
        let mut states: EntityStates<u32> = EntityStates::new();
        let a = EntityId::new();
        let b = EntityId::new();

        *states.get_or_init(a, || 0) = 1;
        *states.get_or_init(b, || 0) = 2;

        assert_eq!(states.get(a), Some(&1));
        assert_eq!(states.get(b), Some(&2));
    }

    #[test]
    fn test_drain_empties() {
        let mut states: EntityStates<u32> = EntityStates::new();
        states.get_or_init(EntityId::new(), || 1);
        states.get_or_init(EntityId::new(), || 2);

        let mut drained: Vec<u32> = states.drain().map(|(_, v)| v).collect();
        drained.sort_unstable();
        assert_eq!(drained, vec![1, 2]);
        assert!(states.is_empty());
    }
}
