//! Simulated entities as seen by the AI core
//!
//! The world owns entities through [`EntityHandle`]s. The AI core only keeps
//! [`WeakEntity`] references and resolves them each tick, so an entity that is
//! dropped between frames simply stops being updated.

pub mod state;

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::vec2::Vec2;

pub use state::{EntityState, EntityStateMachine};

/// Stable entity identity, usable as a map key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning handle held by the game world
pub type EntityHandle = Arc<Entity>;

/// Non-owning reference held by behaviors and the AI manager
pub type WeakEntity = Weak<Entity>;

/// Position and velocity of an entity at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    pub position: Vec2,
    /// Units per second
    pub velocity: Vec2,
}

/// A simulated game object
///
/// Kinematics sit behind a lock so behaviors running on worker threads can
/// write velocities while the owner keeps its handle.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    name: String,
    kinematics: RwLock<Kinematics>,
}

impl Entity {
    pub fn new(name: impl Into<String>, position: Vec2) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            kinematics: RwLock::new(Kinematics {
                position,
                velocity: Vec2::ZERO,
            }),
        }
    }

    /// Create an entity already wrapped in an owning handle
    pub fn spawn(name: impl Into<String>, position: Vec2) -> EntityHandle {
        Arc::new(Self::new(name, position))
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Vec2 {
        self.kinematics.read().position
    }

    pub fn set_position(&self, position: Vec2) {
        self.kinematics.write().position = position;
    }

    pub fn velocity(&self) -> Vec2 {
        self.kinematics.read().velocity
    }

    pub fn set_velocity(&self, velocity: Vec2) {
        self.kinematics.write().velocity = velocity;
    }

    /// Zero the velocity, leaving the entity motionless
    pub fn halt(&self) {
        self.set_velocity(Vec2::ZERO);
    }

    pub fn kinematics(&self) -> Kinematics {
        *self.kinematics.read()
    }

    /// Advance position by the current velocity
    pub fn integrate(&self, dt: f32) {
        let mut k = self.kinematics.write();
        let step = k.velocity * dt;
        k.position += step;
    }
}
