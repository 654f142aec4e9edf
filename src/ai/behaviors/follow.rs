//! Follow behavior
//!
//! Keeps an entity near the player target. The mode picks where "near" is;
//! steering toward that point is shared: turn-rate limiting, separation from
//! nearby entities, optional smoothing, and a catch-up boost when the entity
//! falls too far behind.

use std::any::Any;
use std::sync::Arc;

use tracing::trace;

use crate::ai::behavior::{halt, Behavior, BehaviorMessage, TargetView, TickContext};
use crate::ai::entity_states::EntityStates;
use crate::ai::formation::{slot_offset, FormationSlots};
use crate::entity::{Entity, EntityId};
use crate::util::vec2::{angle_difference, Vec2};

pub const NAME: &str = "Follow";

/// Distance at which the desired position counts as reached
const ARRIVAL_TOLERANCE: f32 = 5.0;
/// Inside this distance the entity slows down proportionally
const SLOWING_RADIUS: f32 = 40.0;
/// Escort entities within this distance of their slot are in formation
const FORMATION_TOLERANCE: f32 = 20.0;
/// Blend factor toward the new velocity when smoothing is on
const SMOOTHING_FACTOR: f32 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FollowMode {
    /// Stay very close to the target
    CloseFollow,
    /// Keep the preferred distance
    #[default]
    LooseFollow,
    /// Hold position beside the target's heading
    FlankingFollow,
    /// Trail behind the target
    RearGuard,
    /// Take a slot in a ring formation around the target
    EscortFormation,
}

#[derive(Debug, Clone)]
struct FollowState {
    last_target_position: Vec2,
    target_heading: Vec2,
    current_velocity: Vec2,
    desired_position: Vec2,
    stationary_time: f32,
    distance_to_target: f32,
    target_moving: bool,
    is_following: bool,
    in_formation: bool,
    formation_slot: Option<usize>,
}

impl Default for FollowState {
    fn default() -> Self {
        Self {
            last_target_position: Vec2::ZERO,
            target_heading: Vec2::new(1.0, 0.0),
            current_velocity: Vec2::ZERO,
            desired_position: Vec2::ZERO,
            stationary_time: 0.0,
            distance_to_target: 0.0,
            target_moving: false,
            is_following: false,
            in_formation: false,
            formation_slot: None,
        }
    }
}

#[derive(Debug)]
pub struct FollowBehavior {
    mode: FollowMode,
    /// Units per second
    follow_speed: f32,
    follow_distance: f32,
    max_distance: f32,
    catch_up_multiplier: f32,
    formation_offset: Vec2,
    formation_radius: f32,
    avoidance_radius: f32,
    /// Degrees per second
    max_turn_rate: f32,
    /// Target speed (units/s) below which it counts as standing still
    min_movement_threshold: f32,
    path_smoothing: bool,
    stop_when_target_stops: bool,
    /// Seconds the target must stand still before followers stop
    stationary_threshold: f32,
    predictive: bool,
    prediction_time: f32,
    active: bool,
    /// Set by `ReleaseEntities`; holds every entity still until the next `init`
    released: bool,
    slots: Arc<FormationSlots>,
    states: EntityStates<FollowState>,
}

impl FollowBehavior {
    pub fn new(follow_speed: f32, follow_distance: f32, max_distance: f32) -> Self {
        Self {
            mode: FollowMode::default(),
            follow_speed,
            follow_distance,
            max_distance,
            catch_up_multiplier: 1.5,
            formation_offset: Vec2::ZERO,
            formation_radius: 80.0,
            avoidance_radius: 30.0,
            max_turn_rate: 180.0,
            min_movement_threshold: 5.0,
            path_smoothing: true,
            stop_when_target_stops: true,
            stationary_threshold: 1.0,
            predictive: false,
            prediction_time: 0.5,
            active: true,
            released: false,
            slots: Arc::new(FormationSlots::new()),
            states: EntityStates::new(),
        }
    }

    pub fn with_mode(mode: FollowMode, follow_speed: f32) -> Self {
        let mut follow = Self::new(follow_speed, 100.0, 300.0);
        follow.mode = mode;
        follow
    }

    pub fn set_follow_speed(&mut self, speed: f32) {
        self.follow_speed = speed;
    }

    pub fn set_follow_distance(&mut self, distance: f32) {
        self.follow_distance = distance;
    }

    pub fn set_max_distance(&mut self, distance: f32) {
        self.max_distance = distance;
    }

    /// Switching away from escort releases every held formation slot
    pub fn set_follow_mode(&mut self, mode: FollowMode) {
        if self.mode == FollowMode::EscortFormation && mode != FollowMode::EscortFormation {
            for state in self.states.values_mut() {
                if let Some(slot) = state.formation_slot.take() {
                    self.slots.release(slot);
                }
                state.in_formation = false;
            }
        }
        self.mode = mode;
    }

    pub fn set_catch_up_speed(&mut self, multiplier: f32) {
        self.catch_up_multiplier = multiplier;
    }

    pub fn set_formation_offset(&mut self, offset: Vec2) {
        self.formation_offset = offset;
    }

    pub fn set_formation_radius(&mut self, radius: f32) {
        self.formation_radius = radius;
    }

    pub fn set_avoidance_radius(&mut self, radius: f32) {
        self.avoidance_radius = radius;
    }

    pub fn set_path_smoothing(&mut self, enabled: bool) {
        self.path_smoothing = enabled;
    }

    pub fn set_max_turn_rate(&mut self, degrees_per_second: f32) {
        self.max_turn_rate = degrees_per_second;
    }

    pub fn set_stop_when_target_stops(&mut self, stop: bool) {
        self.stop_when_target_stops = stop;
    }

    pub fn set_minimum_movement_threshold(&mut self, threshold: f32) {
        self.min_movement_threshold = threshold;
    }

    pub fn set_predictive_following(&mut self, enabled: bool, prediction_time: f32) {
        self.predictive = enabled;
        self.prediction_time = prediction_time;
    }

    pub fn follow_mode(&self) -> FollowMode {
        self.mode
    }

    pub fn follow_speed(&self) -> f32 {
        self.follow_speed
    }

    pub fn formation_slots(&self) -> &Arc<FormationSlots> {
        &self.slots
    }

    pub fn is_following(&self, id: EntityId) -> bool {
        self.states.get(id).map(|s| s.is_following).unwrap_or(false)
    }

    pub fn is_in_formation(&self, id: EntityId) -> bool {
        self.states.get(id).map(|s| s.in_formation).unwrap_or(false)
    }

    pub fn distance_to_target(&self, id: EntityId) -> Option<f32> {
        self.states.get(id).map(|s| s.distance_to_target)
    }

    /// Last observed target position for this entity
    pub fn target_position(&self, id: EntityId) -> Option<Vec2> {
        self.states.get(id).map(|s| s.last_target_position)
    }

    pub fn formation_slot(&self, id: EntityId) -> Option<usize> {
        self.states.get(id).and_then(|s| s.formation_slot)
    }

    pub fn tracked_entities(&self) -> usize {
        self.states.len()
    }

    fn release_all(&mut self) {
        for (_, state) in self.states.drain() {
            if let Some(slot) = state.formation_slot {
                self.slots.release(slot);
            }
        }
    }

    fn desired_position(&self, position: Vec2, target: Vec2, state: &FollowState) -> Vec2 {
        let away = (position - target).normalize();
        let away = if away == Vec2::ZERO { -state.target_heading } else { away };
        let heading = state.target_heading;

        match self.mode {
            FollowMode::CloseFollow => target + away * (self.follow_distance * 0.5),
            FollowMode::LooseFollow => target + away * self.follow_distance,
            FollowMode::FlankingFollow => {
                // Stay on whichever side the entity is already on
                let side = if heading.cross(position - target) >= 0.0 { 1.0 } else { -1.0 };
                target + heading.perpendicular() * (self.follow_distance * side)
            }
            FollowMode::RearGuard => target - heading * self.follow_distance,
            FollowMode::EscortFormation => {
                let slot = state.formation_slot.unwrap_or(0);
                let offset = slot_offset(slot, self.formation_radius) + self.formation_offset;
                target + offset.rotate(heading.angle())
            }
        }
    }

    /// Push away from neighbors inside the avoidance radius
    fn separation(&self, id: EntityId, target_id: EntityId, position: Vec2, ctx: &TickContext) -> Vec2 {
        if self.avoidance_radius <= 0.0 {
            return Vec2::ZERO;
        }
        let mut push = Vec2::ZERO;
        for (other, kinematics) in ctx.neighbors() {
            if *other == id || *other == target_id {
                continue;
            }
            let (direction, distance) = (position - kinematics.position).normalize_with_length();
            if distance > 0.0 && distance < self.avoidance_radius {
                push += direction * (1.0 - distance / self.avoidance_radius);
            }
        }
        push
    }

    fn limit_turn(&self, current: Vec2, desired: Vec2, dt: f32) -> Vec2 {
        let speed = desired.length();
        if current.is_zero(1e-3) || speed == 0.0 || self.max_turn_rate <= 0.0 {
            return desired;
        }
        let from = current.angle();
        let max_step = self.max_turn_rate.to_radians() * dt;
        let step = angle_difference(from, desired.angle()).clamp(-max_step, max_step);
        Vec2::from_angle(from + step) * speed
    }

    fn observe_target(&self, state: &mut FollowState, target: &TargetView, dt: f32) {
        let target_speed = if target.velocity.is_zero(1e-6) && dt > 0.0 {
            target.position.distance_to(state.last_target_position) / dt
        } else {
            target.velocity.length()
        };

        if target_speed >= self.min_movement_threshold {
            state.target_moving = true;
            state.stationary_time = 0.0;
        } else {
            state.stationary_time += dt;
            state.target_moving = state.stationary_time < self.stationary_threshold;
        }

        let (heading, length) = target.velocity.normalize_with_length();
        if length > 0.0 {
            state.target_heading = heading;
        }
        state.last_target_position = target.position;
    }
}

impl Default for FollowBehavior {
    fn default() -> Self {
        Self::new(150.0, 100.0, 300.0)
    }
}

impl Behavior for FollowBehavior {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&mut self, entity: &Entity) {
        self.released = false;
        let escort = self.mode == FollowMode::EscortFormation;
        let slots = self.slots.clone();
        let state = self.states.get_or_init(entity.id(), FollowState::default);
        if escort && state.formation_slot.is_none() {
            let slot = slots.allocate();
            trace!("Entity {} took formation slot {}", entity.id(), slot);
            state.formation_slot = Some(slot);
        }
        state.is_following = false;
        state.current_velocity = entity.velocity();
    }

    fn update(&mut self, entity: &Entity, ctx: &TickContext) {
        if !self.active || self.released {
            entity.halt();
            return;
        }

        let Some(target) = ctx.player else {
            entity.halt();
            if let Some(state) = self.states.get_mut(entity.id()) {
                state.is_following = false;
                state.current_velocity = Vec2::ZERO;
            }
            return;
        };

        if !self.states.contains(entity.id()) {
            self.init(entity);
            if let Some(state) = self.states.get_mut(entity.id()) {
                state.last_target_position = target.position;
            }
        }
        let Some(mut state) = self.states.remove(entity.id()) else {
            entity.halt();
            return;
        };

        let position = ctx.kinematics(entity).position;
        self.observe_target(&mut state, &target, ctx.dt);

        let target_pos = if self.predictive {
            target.position + target.velocity * self.prediction_time
        } else {
            target.position
        };
        let desired = self.desired_position(position, target_pos, &state);
        state.desired_position = desired;
        state.distance_to_target = position.distance_to(target.position);

        let (direction, remaining) = (desired - position).normalize_with_length();
        state.in_formation =
            state.formation_slot.is_some() && remaining <= FORMATION_TOLERANCE;

        let target_stopped = self.stop_when_target_stops && !state.target_moving;
        if remaining <= ARRIVAL_TOLERANCE
            || (target_stopped && state.distance_to_target <= self.max_distance && remaining <= self.follow_distance)
        {
            entity.halt();
            state.current_velocity = Vec2::ZERO;
            state.is_following = false;
            self.states.insert(entity.id(), state);
            return;
        }

        let mut speed = self.follow_speed;
        if state.distance_to_target > self.max_distance {
            speed *= self.catch_up_multiplier;
        }
        if remaining < SLOWING_RADIUS {
            speed *= remaining / SLOWING_RADIUS;
        }

        let mut velocity = direction * speed;
        let push = self.separation(entity.id(), target.id, position, ctx);
        if push != Vec2::ZERO {
            velocity = (velocity + push * speed).clamp_length(speed);
        }

        velocity = self.limit_turn(state.current_velocity, velocity, ctx.dt);
        if self.path_smoothing && !state.current_velocity.is_zero(1e-3) {
            velocity = state.current_velocity.lerp(velocity, SMOOTHING_FACTOR);
        }

        entity.set_velocity(velocity);
        state.current_velocity = velocity;
        state.is_following = true;
        self.states.insert(entity.id(), state);
    }

    fn clean(&mut self, entity: Option<&Entity>) {
        match entity {
            Some(entity) => {
                entity.halt();
                if let Some(slot) = self
                    .states
                    .remove(entity.id())
                    .and_then(|state| state.formation_slot)
                {
                    self.slots.release(slot);
                }
            }
            None => self.release_all(),
        }
    }

    fn on_message(&mut self, entity: Option<&Entity>, message: &BehaviorMessage) {
        match message {
            BehaviorMessage::Pause => {
                self.active = false;
                halt(entity);
            }
            BehaviorMessage::Resume => {
                self.active = true;
                if let Some(entity) = entity.filter(|_| !self.released) {
                    self.init(entity);
                }
            }
            BehaviorMessage::LoseTarget => {
                halt(entity);
                let ids: Vec<EntityId> = match entity {
                    Some(entity) => vec![entity.id()],
                    None => self.states.ids().collect(),
                };
                for id in ids {
                    if let Some(state) = self.states.get_mut(id) {
                        state.is_following = false;
                        state.current_velocity = Vec2::ZERO;
                    }
                }
            }
            BehaviorMessage::ReleaseEntities => {
                halt(entity);
                self.release_all();
                self.released = true;
            }
            BehaviorMessage::Custom(_) => {}
        }
    }

    fn clone_behavior(&self) -> Box<dyn Behavior> {
        Box::new(Self {
            mode: self.mode,
            follow_speed: self.follow_speed,
            follow_distance: self.follow_distance,
            max_distance: self.max_distance,
            catch_up_multiplier: self.catch_up_multiplier,
            formation_offset: self.formation_offset,
            formation_radius: self.formation_radius,
            avoidance_radius: self.avoidance_radius,
            max_turn_rate: self.max_turn_rate,
            min_movement_threshold: self.min_movement_threshold,
            path_smoothing: self.path_smoothing,
            stop_when_target_stops: self.stop_when_target_stops,
            stationary_threshold: self.stationary_threshold,
            predictive: self.predictive,
            prediction_time: self.prediction_time,
            active: self.active,
            released: false,
            slots: self.slots.clone(),
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
