//! Entity-level state machine
//!
//! Each entity can run a small set of named states (idle, orbiting, ...).
//! Switching always exits the old state before entering the new one.

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::entity::Entity;

/// A state an entity can be in
pub trait EntityState: Send {
    fn name(&self) -> &str;
    fn enter(&mut self, entity: &Entity);
    fn update(&mut self, entity: &Entity, dt: f32);
    fn exit(&mut self, entity: &Entity);
}

/// Named-state machine driving a single entity
#[derive(Default)]
pub struct EntityStateMachine {
    states: HashMap<String, Box<dyn EntityState>>,
    current: Option<String>,
}

impl EntityStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state under its own name, replacing any previous one
    pub fn add_state(&mut self, state: Box<dyn EntityState>) {
        let name = state.name().to_string();
        self.states.insert(name, state);
    }

    /// Remove a state; removing the current one exits it first
    pub fn remove_state(&mut self, entity: &Entity, name: &str) -> bool {
        if self.current.as_deref() == Some(name) {
            if let Some(state) = self.states.get_mut(name) {
                state.exit(entity);
            }
            self.current = None;
        }
        self.states.remove(name).is_some()
    }

    /// Switch to `name`; unknown names leave the current state untouched
    pub fn set_state(&mut self, entity: &Entity, name: &str) -> bool {
        if !self.states.contains_key(name) {
            warn!("Entity {} has no state '{}'", entity.id(), name);
            return false;
        }

        if let Some(current) = self.current.take() {
            if let Some(state) = self.states.get_mut(&current) {
                state.exit(entity);
            }
        }

        if let Some(state) = self.states.get_mut(name) {
            debug!("Entity {} entering state '{}'", entity.id(), name);
            state.enter(entity);
        }
        self.current = Some(name.to_string());
        true
    }

    pub fn current_state(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn update(&mut self, entity: &Entity, dt: f32) {
        if let Some(current) = self.current.as_deref() {
            if let Some(state) = self.states.get_mut(current) {
                state.update(entity, dt);
            }
        }
    }

    /// Exit the current state and forget every registered state
    pub fn clear(&mut self, entity: &Entity) {
        if let Some(current) = self.current.take() {
            if let Some(state) = self.states.get_mut(&current) {
                state.exit(entity);
            }
        }
        self.states.clear();
    }
}
