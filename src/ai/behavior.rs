//! Behavior contract shared by every AI strategy
//!
//! A registered behavior is a prototype holding configuration. The manager
//! clones it per entity, calls `init` once on assignment, `update` every
//! tick, and `clean` on unassignment or reset.

use std::any::Any;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::entity::{Entity, EntityId, Kinematics};
use crate::util::vec2::Vec2;

/// Control messages delivered to behaviors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BehaviorMessage {
    /// Stop running logic and zero velocity
    Pause,
    /// Resume logic and reinitialize tracking state
    Resume,
    /// Forget the current target without releasing it
    LoseTarget,
    /// Drop every held entity reference (scene teardown)
    ReleaseEntities,
    /// Anything else; behaviors that don't know it ignore it
    Custom(String),
}

impl BehaviorMessage {
    pub fn as_str(&self) -> &str {
        match self {
            BehaviorMessage::Pause => "pause",
            BehaviorMessage::Resume => "resume",
            BehaviorMessage::LoseTarget => "lose_target",
            BehaviorMessage::ReleaseEntities => "release_entities",
            BehaviorMessage::Custom(text) => text,
        }
    }
}

impl From<&str> for BehaviorMessage {
    fn from(text: &str) -> Self {
        match text {
            "pause" => BehaviorMessage::Pause,
            "resume" => BehaviorMessage::Resume,
            "lose_target" => BehaviorMessage::LoseTarget,
            "release_entities" => BehaviorMessage::ReleaseEntities,
            other => BehaviorMessage::Custom(other.to_string()),
        }
    }
}

impl From<String> for BehaviorMessage {
    fn from(text: String) -> Self {
        BehaviorMessage::from(text.as_str())
    }
}

impl fmt::Display for BehaviorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frozen view of a target entity for the current tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetView {
    pub id: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Per-tick inputs shared by every behavior update
///
/// Kinematics of every assigned entity (and the player) are captured before
/// dispatch, so all behaviors in one tick read the same positions.
#[derive(Debug, Clone, Default)]
pub struct TickContext {
    pub dt: f32,
    pub tick: u64,
    pub player: Option<TargetView>,
    snapshot: FxHashMap<EntityId, Kinematics>,
}

impl TickContext {
    pub fn new(dt: f32, tick: u64) -> Self {
        Self {
            dt,
            tick,
            player: None,
            snapshot: FxHashMap::default(),
        }
    }

    pub fn with_player(mut self, player: Option<TargetView>) -> Self {
        self.player = player;
        self
    }

    /// Freeze an entity's kinematics for this tick
    pub fn capture(&mut self, entity: &Entity) {
        self.snapshot.insert(entity.id(), entity.kinematics());
    }

    /// Kinematics as of the start of the tick; entities outside the
    /// snapshot are read live
    pub fn kinematics(&self, entity: &Entity) -> Kinematics {
        self.snapshot
            .get(&entity.id())
            .copied()
            .unwrap_or_else(|| entity.kinematics())
    }

    /// Frozen view of any entity
    pub fn view(&self, entity: &Entity) -> TargetView {
        let k = self.kinematics(entity);
        TargetView {
            id: entity.id(),
            position: k.position,
            velocity: k.velocity,
        }
    }

    /// Every captured entity with its frozen kinematics
    pub fn neighbors(&self) -> impl Iterator<Item = (&EntityId, &Kinematics)> {
        self.snapshot.iter()
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot.len()
    }
}

/// An AI strategy
///
/// Implementations keep configuration in their own fields and per-entity
/// runtime state in an [`EntityStates`](crate::ai::entity_states::EntityStates)
/// arena. `update` must tolerate a paused behavior or an expired target by
/// leaving the entity motionless.
pub trait Behavior: Send + Sync + Any {
    fn name(&self) -> &str;

    /// Establish runtime state for a newly assigned entity. Calling it again
    /// on an entity that already has state reuses that record.
    fn init(&mut self, entity: &Entity);

    /// One simulation tick for one entity
    fn update(&mut self, entity: &Entity, ctx: &TickContext);

    /// Release runtime state for `entity`, or for every entity when `None`.
    /// Safe to call repeatedly.
    fn clean(&mut self, entity: Option<&Entity>);

    fn on_message(&mut self, entity: Option<&Entity>, message: &BehaviorMessage);

    /// Copy of the configuration only; runtime state is never cloned
    fn clone_behavior(&self) -> Box<dyn Behavior>;

    fn is_active(&self) -> bool;

    fn set_active(&mut self, active: bool);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Zero the velocity of an optional entity
#[inline]
pub(crate) fn halt(entity: Option<&Entity>) {
    if let Some(entity) = entity {
        entity.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_parsing() {
        assert_eq!(BehaviorMessage::from("pause"), BehaviorMessage::Pause);
        assert_eq!(BehaviorMessage::from("resume"), BehaviorMessage::Resume);
        assert_eq!(BehaviorMessage::from("lose_target"), BehaviorMessage::LoseTarget);
        assert_eq!(
            BehaviorMessage::from("release_entities"),
            BehaviorMessage::ReleaseEntities
        );
        assert_eq!(
            BehaviorMessage::from("dance"),
            BehaviorMessage::Custom("dance".to_string())
        );
        assert_eq!(BehaviorMessage::Custom("dance".into()).to_string(), "dance");
        assert_eq!(BehaviorMessage::ReleaseEntities.as_str(), "release_entities");
    }

    #[test]
    fn test_context_reads_frozen_kinematics() {
        let entity = Entity::new("npc", Vec2::new(1.0, 2.0));
        let mut ctx = TickContext::new(0.016, 1);
        ctx.capture(&entity);

        entity.set_position(Vec2::new(50.0, 50.0));

        assert_eq!(ctx.kinematics(&entity).position, Vec2::new(1.0, 2.0));
        assert_eq!(ctx.snapshot_len(), 1);
    }

    #[test]
    fn test_context_falls_back_to_live_read() {
        let entity = Entity::new("npc", Vec2::new(3.0, 4.0));
        let ctx = TickContext::new(0.016, 1);
        let view = ctx.view(&entity);
        assert_eq!(view.position, Vec2::new(3.0, 4.0));
        assert_eq!(view.id, entity.id());
    }
}
