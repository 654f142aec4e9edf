//! Chase behavior
//!
//! ```text
//!  NotChasing ──(in range + sight)──▶ Chasing ──(out of range)──▶ NotChasing
//!                                      │  ▲
//!                          (sight lost)│  │(sight regained)
//!                                      ▼  │
//!                               TrackingLastKnown ──(timeout)──▶ NotChasing
//! ```
//!
//! Within `min_range` of a visible target the entity holds position and the
//! reached callback fires; it fires on every tick that condition holds.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::ai::behavior::{halt, Behavior, BehaviorMessage, TickContext};
use crate::ai::entity_states::EntityStates;
use crate::entity::{Entity, EntityHandle, EntityId, WeakEntity};
use crate::util::vec2::Vec2;

pub const NAME: &str = "Chase";

/// Speed factor used while heading to the last known target position
const TRACKING_SPEED_FACTOR: f32 = 0.8;
/// Distance at which the last known position counts as reached
const LAST_KNOWN_ARRIVAL: f32 = 10.0;

/// Line-of-sight test from entity position to target position
pub type LineOfSight = Arc<dyn Fn(Vec2, Vec2) -> bool + Send + Sync>;

/// Callback invoked with the chasing entity
pub type ChaseCallback = Arc<dyn Fn(&Entity) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChaseMode {
    #[default]
    NotChasing,
    Chasing,
    TrackingLastKnown,
}

#[derive(Debug, Clone, Default)]
struct ChaseState {
    mode: ChaseMode,
    has_line_of_sight: bool,
    last_known_target_pos: Vec2,
    ticks_without_sight: u32,
}

pub struct ChaseBehavior {
    target: WeakEntity,
    chase_speed: f32,
    max_range: f32,
    min_range: f32,
    max_ticks_without_sight: u32,
    line_of_sight: Option<LineOfSight>,
    on_target_reached: Option<ChaseCallback>,
    on_target_lost: Option<ChaseCallback>,
    active: bool,
    states: EntityStates<ChaseState>,
}

impl ChaseBehavior {
    pub fn new(chase_speed: f32, max_range: f32, min_range: f32) -> Self {
        Self {
            target: Weak::new(),
            chase_speed,
            max_range,
            min_range,
            max_ticks_without_sight: 60,
            line_of_sight: None,
            on_target_reached: None,
            on_target_lost: None,
            active: true,
            states: EntityStates::new(),
        }
    }

    pub fn with_target(mut self, target: &EntityHandle) -> Self {
        self.target = Arc::downgrade(target);
        self
    }

    /// Replace the default distance check with a custom visibility test
    pub fn with_line_of_sight(mut self, test: LineOfSight) -> Self {
        self.line_of_sight = Some(test);
        self
    }

    pub fn on_target_reached(mut self, callback: ChaseCallback) -> Self {
        self.on_target_reached = Some(callback);
        self
    }

    pub fn on_target_lost(mut self, callback: ChaseCallback) -> Self {
        self.on_target_lost = Some(callback);
        self
    }

    /// Change target; every entity's chase state starts over
    pub fn set_target(&mut self, target: Option<&EntityHandle>) {
        for state in self.states.values_mut() {
            *state = ChaseState::default();
        }
        self.target = target.map(Arc::downgrade).unwrap_or_default();
    }

    pub fn target(&self) -> Option<EntityHandle> {
        self.target.upgrade()
    }

    pub fn set_chase_speed(&mut self, speed: f32) {
        self.chase_speed = speed;
    }

    pub fn set_max_range(&mut self, range: f32) {
        self.max_range = range;
    }

    pub fn set_min_range(&mut self, range: f32) {
        self.min_range = range;
    }

    pub fn set_max_ticks_without_sight(&mut self, ticks: u32) {
        self.max_ticks_without_sight = ticks;
    }

    pub fn chase_speed(&self) -> f32 {
        self.chase_speed
    }

    pub fn max_range(&self) -> f32 {
        self.max_range
    }

    pub fn min_range(&self) -> f32 {
        self.min_range
    }

    pub fn is_chasing(&self, id: EntityId) -> bool {
        self.states
            .get(id)
            .map(|s| s.mode != ChaseMode::NotChasing)
            .unwrap_or(false)
    }

    pub fn has_line_of_sight(&self, id: EntityId) -> bool {
        self.states
            .get(id)
            .map(|s| s.has_line_of_sight)
            .unwrap_or(false)
    }

    pub fn mode(&self, id: EntityId) -> Option<ChaseMode> {
        self.states.get(id).map(|s| s.mode)
    }

    pub fn tracked_entities(&self) -> usize {
        self.states.len()
    }

    fn check_line_of_sight(&self, from: Vec2, to: Vec2) -> bool {
        match &self.line_of_sight {
            Some(test) => test(from, to),
            None => from.distance_to(to) <= self.max_range,
        }
    }

    fn target_lost(&self, entity: &Entity) {
        if let Some(callback) = &self.on_target_lost {
            callback(entity);
        }
    }

    fn target_reached(&self, entity: &Entity) {
        if let Some(callback) = &self.on_target_reached {
            callback(entity);
        }
    }

    /// Head toward the last known position until the sight budget runs out
    fn track_last_known(&mut self, entity: &Entity, position: Vec2) {
        let speed = self.chase_speed * TRACKING_SPEED_FACTOR;
        let max_ticks = self.max_ticks_without_sight;
        let Some(state) = self.states.get_mut(entity.id()) else {
            entity.halt();
            return;
        };

        if state.ticks_without_sight < max_ticks {
            let (direction, distance) =
                (state.last_known_target_pos - position).normalize_with_length();
            if distance > LAST_KNOWN_ARRIVAL {
                entity.set_velocity(direction * speed);
            } else {
                entity.halt();
            }
            state.ticks_without_sight += 1;
        } else {
            state.mode = ChaseMode::NotChasing;
            entity.halt();
            debug!("Entity {} gave up chase after {} ticks", entity.id(), max_ticks);
            self.target_lost(entity);
        }
    }
}

impl Default for ChaseBehavior {
    fn default() -> Self {
        Self::new(120.0, 500.0, 50.0)
    }
}

impl fmt::Debug for ChaseBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChaseBehavior")
            .field("has_target", &(self.target.strong_count() > 0))
            .field("chase_speed", &self.chase_speed)
            .field("max_range", &self.max_range)
            .field("min_range", &self.min_range)
            .field("active", &self.active)
            .field("tracked", &self.states.len())
            .finish()
    }
}

impl Behavior for ChaseBehavior {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&mut self, entity: &Entity) {
        let target = self.target.upgrade();
        let max_range = self.max_range;
        let (in_range, sight) = match &target {
            Some(target) => {
                let from = entity.position();
                let to = target.position();
                (from.distance_to(to) <= max_range, self.check_line_of_sight(from, to))
            }
            None => (false, false),
        };

        let state = self.states.get_or_init(entity.id(), ChaseState::default);
        state.mode = if in_range && sight {
            ChaseMode::Chasing
        } else {
            ChaseMode::NotChasing
        };
        state.has_line_of_sight = sight;
        state.ticks_without_sight = 0;
    }

    fn update(&mut self, entity: &Entity, ctx: &TickContext) {
        if !self.active {
            entity.halt();
            return;
        }

        let Some(target) = self.target.upgrade() else {
            entity.halt();
            if let Some(state) = self.states.get_mut(entity.id()) {
                state.mode = ChaseMode::NotChasing;
                state.has_line_of_sight = false;
            }
            return;
        };

        let position = ctx.kinematics(entity).position;
        let target_pos = ctx.kinematics(&target).position;
        let (direction, distance) = (target_pos - position).normalize_with_length();

        if distance > self.max_range {
            let was_chasing = self
                .states
                .get_or_init(entity.id(), ChaseState::default)
                .mode
                != ChaseMode::NotChasing;
            if let Some(state) = self.states.get_mut(entity.id()) {
                state.mode = ChaseMode::NotChasing;
                state.has_line_of_sight = false;
            }
            entity.halt();
            if was_chasing {
                self.target_lost(entity);
            }
            return;
        }

        let sight = self.check_line_of_sight(position, target_pos);
        let state = self.states.get_or_init(entity.id(), ChaseState::default);
        state.has_line_of_sight = sight;

        if sight {
            state.mode = ChaseMode::Chasing;
            state.last_known_target_pos = target_pos;
            state.ticks_without_sight = 0;

            if distance > self.min_range {
                entity.set_velocity(direction * self.chase_speed);
            } else {
                entity.halt();
                self.target_reached(entity);
            }
            return;
        }

        match state.mode {
            ChaseMode::Chasing => {
                state.mode = ChaseMode::TrackingLastKnown;
                state.ticks_without_sight = 0;
                self.track_last_known(entity, position);
            }
            ChaseMode::TrackingLastKnown => self.track_last_known(entity, position),
            ChaseMode::NotChasing => entity.halt(),
        }
    }

    fn clean(&mut self, entity: Option<&Entity>) {
        match entity {
            Some(entity) => {
                entity.halt();
                self.states.remove(entity.id());
            }
            None => self.states.clear(),
        }
        self.target = Weak::new();
    }

    fn on_message(&mut self, entity: Option<&Entity>, message: &BehaviorMessage) {
        match message {
            BehaviorMessage::Pause => {
                self.active = false;
                halt(entity);
            }
            BehaviorMessage::Resume => {
                self.active = true;
                if let Some(entity) = entity {
                    if self.target.strong_count() > 0 {
                        self.init(entity);
                    }
                }
            }
            BehaviorMessage::LoseTarget => {
                match entity {
                    Some(entity) => {
                        if let Some(state) = self.states.get_mut(entity.id()) {
                            state.mode = ChaseMode::NotChasing;
                            state.has_line_of_sight = false;
                        }
                        entity.halt();
                    }
                    None => {
                        for state in self.states.values_mut() {
                            state.mode = ChaseMode::NotChasing;
                            state.has_line_of_sight = false;
                        }
                    }
                }
            }
            BehaviorMessage::ReleaseEntities => {
                self.target = Weak::new();
                self.states.clear();
                halt(entity);
            }
            BehaviorMessage::Custom(_) => {}
        }
    }

    fn clone_behavior(&self) -> Box<dyn Behavior> {
        Box::new(Self {
            target: self.target.clone(),
            chase_speed: self.chase_speed,
            max_range: self.max_range,
            min_range: self.min_range,
            max_ticks_without_sight: self.max_ticks_without_sight,
            line_of_sight: self.line_of_sight.clone(),
            on_target_reached: self.on_target_reached.clone(),
            on_target_lost: self.on_target_lost.clone(),
            active: self.active,
            states: EntityStates::new(),
        })
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
